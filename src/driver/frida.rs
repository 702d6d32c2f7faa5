use crate::driver::android::adb::output_lines;
use crate::driver::traits::{Instrumentation, InstrumentationSession};
use crate::utils::binary_resolver;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use uuid::Uuid;

/// [`Instrumentation`] backed by the `frida` command line tool.
///
/// The binary is resolved on first attach so scripts that never use
/// `frida:` do not require it.
#[derive(Debug, Clone, Default)]
pub struct FridaCli {
    override_path: Option<PathBuf>,
}

impl FridaCli {
    pub fn new(override_path: Option<&Path>) -> Self {
        Self {
            override_path: override_path.map(Path::to_path_buf),
        }
    }
}

#[async_trait]
impl Instrumentation for FridaCli {
    async fn attach(
        &self,
        device: Option<&str>,
        package_id: &str,
    ) -> Result<Box<dyn InstrumentationSession>> {
        let frida_path = binary_resolver::find_frida(self.override_path.as_deref())?;
        Ok(Box::new(FridaSession {
            frida_path,
            device: device.map(str::to_string),
            package_id: package_id.to_string(),
        }))
    }
}

struct FridaSession {
    frida_path: PathBuf,
    device: Option<String>,
    package_id: String,
}

#[async_trait]
impl InstrumentationSession for FridaSession {
    async fn load_script(&mut self, source: &str) -> Result<Vec<String>> {
        let script_file = std::env::temp_dir().join(format!("autodroid-{}.js", Uuid::new_v4()));
        tokio::fs::write(&script_file, source)
            .await
            .with_context(|| format!("Failed to stage script at {}", script_file.display()))?;

        let result = self.run(&script_file).await;
        let _ = tokio::fs::remove_file(&script_file).await;
        result
    }
}

impl FridaSession {
    async fn run(&self, script_file: &Path) -> Result<Vec<String>> {
        let args = session_args(self.device.as_deref(), &self.package_id, script_file);
        log::debug!("frida {}", args.join(" "));

        let output = Command::new(&self.frida_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute frida")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "frida could not attach to {}: {}",
                self.package_id,
                stderr.trim()
            );
        }

        Ok(output_lines(&String::from_utf8_lossy(&output.stdout))
            .into_iter()
            .filter(|l| !l.trim().is_empty())
            .collect())
    }
}

fn session_args(device: Option<&str>, package_id: &str, script_file: &Path) -> Vec<String> {
    let mut args = Vec::new();
    match device {
        Some(serial) => {
            args.push("-D".to_string());
            args.push(serial.to_string());
        }
        None => args.push("-U".to_string()),
    }
    args.push("-N".to_string());
    args.push(package_id.to_string());
    args.push("-l".to_string());
    args.push(script_file.display().to_string());
    args.push("-q".to_string());
    args.push("--eternalize".to_string());
    args
}
