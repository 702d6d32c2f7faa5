pub mod android;
pub mod apk;
#[cfg(test)]
pub mod fake;
pub mod frida;
pub mod traits;
