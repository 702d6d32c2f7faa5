use crate::driver::apk::{ApkInfo, MethodSignature};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// Device discovery, package queries and shell execution.
///
/// `run_shell` with `device = None` runs the command on the host shell;
/// with a device it runs inside that device's shell.
#[async_trait]
pub trait DeviceBridge: Send + Sync {
    /// Program prefix used to address the bridge from shell text (e.g. the
    /// adb binary path). `!adb_connect` is built from it.
    fn command_prefix(&self) -> String;

    /// Whether the bridge tool responds at all
    async fn is_available(&self) -> bool;

    /// Serials of connected devices, in the order the bridge reports them
    async fn list_connected_devices(&self) -> Result<Vec<String>>;

    /// Installed package ids. `None` addresses the only connected device.
    async fn list_installed_packages(&self, device: Option<&str>) -> Result<Vec<String>>;

    /// Install path(s) of a package (split APKs yield several)
    async fn resolve_install_paths(&self, device: &str, package: &str) -> Result<Vec<String>>;

    /// Run shell text and return stdout lines. A non-zero exit is an error.
    async fn run_shell(&self, device: Option<&str>, command: &str) -> Result<Vec<String>>;
}

/// Dynamic instrumentation backend
#[async_trait]
pub trait Instrumentation: Send + Sync {
    /// Attach to the running process of `package_id`, on `device` when given
    /// or the USB device otherwise
    async fn attach(
        &self,
        device: Option<&str>,
        package_id: &str,
    ) -> Result<Box<dyn InstrumentationSession>>;
}

/// An attached instrumentation session
#[async_trait]
pub trait InstrumentationSession: Send {
    /// Load script source into the attached process. Returns the messages
    /// the script emitted while loading.
    async fn load_script(&mut self, source: &str) -> Result<Vec<String>>;
}

/// Static APK analysis backend
pub trait ApkAnalyzer: Send + Sync {
    /// Application metadata
    fn info(&self, apk: &Path) -> Result<ApkInfo>;

    /// Decoded `AndroidManifest.xml` as XML text
    fn manifest(&self, apk: &Path) -> Result<Vec<u8>>;

    /// Methods recovered from the APK's dex files
    fn decompile(&self, apk: &Path) -> Result<Vec<MethodSignature>>;

    /// Rewrite the APK as a plain archive at `dest`
    fn repackage(&self, apk: &Path, dest: &Path) -> Result<()>;
}
