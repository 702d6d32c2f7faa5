//! In-memory backends for exercising the interpreter without adb or frida.

use crate::driver::apk::ZipApkAnalyzer;
use crate::driver::traits::{DeviceBridge, Instrumentation, InstrumentationSession};
use crate::runner::executor::Backends;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeBridge {
    devices: Vec<String>,
    packages: HashMap<Option<String>, Vec<String>>,
    paths: HashMap<(String, String), Vec<String>>,
    outputs: HashMap<String, Vec<String>>,
    failing: Vec<String>,
    hanging: Vec<String>,
    device_list_fails: bool,
    commands: Mutex<Vec<String>>,
    package_queries: Mutex<Vec<Option<String>>>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl FakeBridge {
    pub fn with_devices(mut self, devices: &[&str]) -> Self {
        self.devices = owned(devices);
        self
    }

    pub fn with_packages(mut self, device: Option<&str>, packages: &[&str]) -> Self {
        self.packages
            .insert(device.map(str::to_string), owned(packages));
        self
    }

    pub fn with_path(mut self, device: &str, package: &str, paths: &[&str]) -> Self {
        self.paths
            .insert((device.to_string(), package.to_string()), owned(paths));
        self
    }

    pub fn with_output(mut self, command: &str, lines: &[&str]) -> Self {
        self.outputs.insert(command.to_string(), owned(lines));
        self
    }

    /// Shell text that exits non-zero
    pub fn failing(mut self, command: &str) -> Self {
        self.failing.push(command.to_string());
        self
    }

    /// Shell text that never returns
    pub fn hanging(mut self, command: &str) -> Self {
        self.hanging.push(command.to_string());
        self
    }

    /// `list_connected_devices` returns an error
    pub fn failing_device_list(mut self) -> Self {
        self.device_list_fails = true;
        self
    }

    /// Shell commands received, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn package_queries(&self) -> Vec<Option<String>> {
        self.package_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceBridge for FakeBridge {
    fn command_prefix(&self) -> String {
        "adb".to_string()
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn list_connected_devices(&self) -> Result<Vec<String>> {
        if self.device_list_fails {
            bail!("adb server unreachable");
        }
        Ok(self.devices.clone())
    }

    async fn list_installed_packages(&self, device: Option<&str>) -> Result<Vec<String>> {
        let key = device.map(str::to_string);
        self.package_queries.lock().unwrap().push(key.clone());
        match self.packages.get(&key) {
            Some(packages) => Ok(packages.clone()),
            None => bail!("no package list for {:?}", device),
        }
    }

    async fn resolve_install_paths(&self, device: &str, package: &str) -> Result<Vec<String>> {
        Ok(self
            .paths
            .get(&(device.to_string(), package.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn run_shell(&self, device: Option<&str>, command: &str) -> Result<Vec<String>> {
        let recorded = match device {
            Some(serial) => format!("[{}] {}", serial, command),
            None => command.to_string(),
        };
        self.commands.lock().unwrap().push(recorded);

        if self.hanging.iter().any(|c| c == command) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.failing.iter().any(|c| c == command) {
            bail!("exit status 1: {}", command);
        }
        Ok(self.outputs.get(command).cloned().unwrap_or_default())
    }
}

/// (device, package, script source) for every loaded script
type LoadLog = Arc<Mutex<Vec<(Option<String>, String, String)>>>;

#[derive(Default)]
pub struct FakeInstrumentation {
    loaded: LoadLog,
}

impl FakeInstrumentation {
    pub fn loaded(&self) -> Vec<(Option<String>, String, String)> {
        self.loaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl Instrumentation for FakeInstrumentation {
    async fn attach(
        &self,
        device: Option<&str>,
        package_id: &str,
    ) -> Result<Box<dyn InstrumentationSession>> {
        Ok(Box::new(FakeSession {
            device: device.map(str::to_string),
            package_id: package_id.to_string(),
            loaded: Arc::clone(&self.loaded),
        }))
    }
}

struct FakeSession {
    device: Option<String>,
    package_id: String,
    loaded: LoadLog,
}

#[async_trait]
impl InstrumentationSession for FakeSession {
    async fn load_script(&mut self, source: &str) -> Result<Vec<String>> {
        self.loaded.lock().unwrap().push((
            self.device.clone(),
            self.package_id.clone(),
            source.to_string(),
        ));
        Ok(vec![format!("loaded into {}", self.package_id)])
    }
}

/// Wire fakes into a [`Backends`], keeping handles for assertions
pub fn backends(bridge: FakeBridge) -> (Backends, Arc<FakeBridge>, Arc<FakeInstrumentation>) {
    let bridge = Arc::new(bridge);
    let instrumentation = Arc::new(FakeInstrumentation::default());
    let backends = Backends {
        bridge: bridge.clone(),
        instrumentation: instrumentation.clone(),
        apk: Arc::new(ZipApkAnalyzer::new()),
    };
    (backends, bridge, instrumentation)
}
