use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Timeout applied to every external call (shell, adb, frida, APK analysis).
    /// `None` waits indefinitely.
    pub command_timeout: Option<Duration>,

    /// Where to write the JSON run report, if anywhere
    pub report_path: Option<PathBuf>,

    /// Explicit adb binary
    pub adb_path: Option<PathBuf>,

    /// Explicit frida CLI binary
    pub frida_path: Option<PathBuf>,

    /// Poll interval used while sleeping so cancellation stays responsive
    pub sleep_poll_ms: u64,
}

impl Config {
    /// Build a timeout from a seconds value where 0 means "no timeout"
    pub fn timeout_from_secs(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_timeout: None,
            report_path: None,
            adb_path: None,
            frida_path: None,
            sleep_poll_ms: 100,
        }
    }
}
