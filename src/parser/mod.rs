pub mod command;
pub mod script;
pub mod types;
