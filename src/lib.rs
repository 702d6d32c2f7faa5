pub mod driver;
pub mod parser;
pub mod report;
pub mod runner;
pub mod utils;

// Re-export common items
pub use report::json::generate as generate_report;
pub use runner::{run_loaded, run_script};
