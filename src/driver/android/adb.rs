use crate::driver::traits::DeviceBridge;
use crate::utils::binary_resolver;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// [`DeviceBridge`] backed by the `adb` binary and the host shell
#[derive(Debug, Clone)]
pub struct AdbBridge {
    adb_path: PathBuf,
}

impl AdbBridge {
    /// Resolve the adb binary (explicit override first, see [`binary_resolver`])
    pub fn new(override_path: Option<&Path>) -> Result<Self> {
        let adb_path = binary_resolver::find_adb(override_path)?;
        Ok(Self { adb_path })
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb_path
    }

    /// Execute a raw ADB command
    async fn exec(&self, serial: Option<&str>, args: &[&str]) -> Result<String> {
        let mut full_args = Vec::new();

        if let Some(s) = serial {
            full_args.push("-s");
            full_args.push(s);
        }

        full_args.extend_from_slice(args);
        log::debug!("adb {}", full_args.join(" "));

        let output = Command::new(&self.adb_path)
            .args(&full_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to execute: adb {:?}", full_args))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ADB command failed: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl DeviceBridge for AdbBridge {
    fn command_prefix(&self) -> String {
        let path = self.adb_path.display().to_string();
        if path.contains(char::is_whitespace) {
            format!("\"{}\"", path)
        } else {
            path
        }
    }

    async fn is_available(&self) -> bool {
        match self.exec(None, &["version"]).await {
            Ok(out) => !out.trim().is_empty(),
            Err(e) => {
                log::debug!("adb unavailable: {:#}", e);
                false
            }
        }
    }

    async fn list_connected_devices(&self) -> Result<Vec<String>> {
        let stdout = self
            .exec(None, &["devices"])
            .await
            .context("Failed to list devices")?;
        Ok(parse_devices(&stdout))
    }

    async fn list_installed_packages(&self, device: Option<&str>) -> Result<Vec<String>> {
        let stdout = self
            .exec(device, &["shell", "pm list packages"])
            .await
            .context("Failed to list packages")?;
        Ok(strip_package_prefix(&stdout))
    }

    async fn resolve_install_paths(&self, device: &str, package: &str) -> Result<Vec<String>> {
        let cmd = format!("pm path {}", package);
        let stdout = self
            .exec(Some(device), &["shell", &cmd])
            .await
            .with_context(|| format!("Failed to resolve path of {}", package))?;
        Ok(strip_package_prefix(&stdout))
    }

    async fn run_shell(&self, device: Option<&str>, command: &str) -> Result<Vec<String>> {
        let stdout = match device {
            Some(serial) => self.exec(Some(serial), &["shell", command]).await?,
            None => host_shell(command).await?,
        };
        Ok(output_lines(&stdout))
    }
}

/// Run shell text on the host
pub async fn host_shell(command: &str) -> Result<String> {
    let (program, flag) = if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };
    log::debug!("{} {} {}", program, flag, command);

    let output = Command::new(program)
        .arg(flag)
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("Failed to execute: {}", command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "exit status {}: {}",
            output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr.trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Split command output into lines with `\r` and `\n` removed
pub fn output_lines(stdout: &str) -> Vec<String> {
    stdout.lines().map(|l| l.replace('\r', "")).collect()
}

/// Parse `adb devices` output into serials
pub fn parse_devices(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.replace('\r', ""))
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let serial = line.split('\t').next().unwrap_or("").trim().to_string();
            (!serial.is_empty()).then_some(serial)
        })
        .collect()
}

/// Parse `pm list packages` / `pm path` output, dropping the `package:` prefix
pub fn strip_package_prefix(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.replace('\r', ""))
        .map(|line| line.trim().trim_start_matches("package:").to_string())
        .filter(|line| !line.is_empty())
        .collect()
}
