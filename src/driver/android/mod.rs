pub mod adb;

pub use adb::AdbBridge;
