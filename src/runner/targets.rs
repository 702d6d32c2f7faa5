use super::error::CommandError;
use super::events::EngineEvent;
use super::executor::ScriptExecutor;
use super::state::TargetLabel;
use super::variables::{ADB_CONNECT, APP_ID, APP_PATH, DEVICE_ID};
use crate::parser::script::is_wildcard;

/// Target an `execute_all` call runs against
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub device_id: Option<String>,
    pub app_id: Option<String>,
    pub app_path: Option<String>,
}

impl ExecutionContext {
    pub fn label(&self) -> TargetLabel {
        TargetLabel {
            device_id: self.device_id.clone(),
            app_id: self.app_id.clone(),
        }
    }
}

/// How block execution is repeated across targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    None,
    DevicesOnly,
    AppsOnly,
    DevicesAndApps,
}

impl TargetMode {
    pub fn from_flags(using_devices: bool, using_apps: bool) -> Self {
        match (using_devices, using_apps) {
            (false, false) => TargetMode::None,
            (true, false) => TargetMode::DevicesOnly,
            (false, true) => TargetMode::AppsOnly,
            (true, true) => TargetMode::DevicesAndApps,
        }
    }
}

/// Drive block execution over the device and app lists of a script.
///
/// Wildcard lists (`["*"]`) are resolved through the device bridge; the app
/// wildcard is resolved again for every device. A list that resolves to
/// nothing degrades the mode instead of failing the run. A bridge error while
/// listing devices records a target failure and runs nothing.
pub async fn drive(executor: &mut ScriptExecutor, devices: &[String], apps: &[String]) {
    let devices = match resolve_devices(executor, devices).await {
        Ok(devices) => devices,
        Err(e) => {
            fail_target(executor, TargetLabel::default(), &e);
            return;
        }
    };

    let using_devices = !devices.is_empty();
    if using_devices {
        let connect = format!("{} -s {}", executor.bridge().command_prefix(), DEVICE_ID);
        executor.variables_mut().capture(ADB_CONNECT, connect);
    }

    let mode = TargetMode::from_flags(using_devices, !apps.is_empty());
    log::debug!("Target mode: {:?}", mode);

    match mode {
        TargetMode::None => run_target(executor, ExecutionContext::default()).await,

        TargetMode::DevicesOnly => {
            for device in devices.iter().filter(|d| !d.is_empty()) {
                if executor.is_cancelled() {
                    break;
                }
                enter_device(executor, device);
                run_target(executor, device_context(device)).await;
            }
        }

        TargetMode::AppsOnly => {
            let resolved = match resolve_apps(executor, None, apps).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    fail_target(executor, TargetLabel::default(), &e);
                    return;
                }
            };
            if resolved.is_empty() {
                log::warn!("App list resolved to nothing, running without apps");
                run_target(executor, ExecutionContext::default()).await;
                return;
            }
            for app in resolved {
                if executor.is_cancelled() {
                    break;
                }
                executor.variables_mut().capture(APP_ID, app.as_str());
                let ctx = ExecutionContext {
                    app_id: Some(app),
                    ..Default::default()
                };
                run_target(executor, ctx).await;
            }
        }

        TargetMode::DevicesAndApps => {
            for device in devices.iter().filter(|d| !d.is_empty()) {
                if executor.is_cancelled() {
                    break;
                }
                enter_device(executor, device);
                drive_device_apps(executor, device, apps).await;
            }
        }
    }
}

async fn drive_device_apps(executor: &mut ScriptExecutor, device: &str, apps: &[String]) {
    let resolved = match resolve_apps(executor, Some(device), apps).await {
        Ok(resolved) => resolved,
        Err(e) => {
            fail_target(executor, device_context(device).label(), &e);
            return;
        }
    };

    if resolved.is_empty() {
        log::warn!("No apps resolved on {}, running without apps", device);
        run_target(executor, device_context(device)).await;
        return;
    }

    for app in resolved {
        if executor.is_cancelled() {
            break;
        }
        let ctx = ExecutionContext {
            device_id: Some(device.to_string()),
            app_id: Some(app.clone()),
            app_path: None,
        };

        let paths = executor.bridge().resolve_install_paths(device, &app).await;
        let path = match paths {
            Ok(paths) => match paths.into_iter().find(|p| !p.is_empty()) {
                Some(path) => path,
                None => {
                    let err = CommandError::NoInstallPath {
                        device: device.to_string(),
                        app: app.clone(),
                    };
                    fail_target(executor, ctx.label(), &err);
                    continue;
                }
            },
            Err(e) => {
                fail_target(executor, ctx.label(), &CommandError::backend("adb", e));
                continue;
            }
        };

        executor.variables_mut().capture(APP_ID, app.as_str());
        executor.variables_mut().capture(APP_PATH, path.as_str());
        run_target(
            executor,
            ExecutionContext {
                app_path: Some(path),
                ..ctx
            },
        )
        .await;
    }
}

async fn resolve_devices(
    executor: &ScriptExecutor,
    devices: &[String],
) -> Result<Vec<String>, CommandError> {
    if !is_wildcard(devices) {
        return Ok(devices.to_vec());
    }
    let connected = executor
        .bridge()
        .list_connected_devices()
        .await
        .map_err(|e| CommandError::backend("adb", e))?;
    log::debug!("Connected devices: {:?}", connected);
    Ok(connected.into_iter().filter(|d| !d.is_empty()).collect())
}

async fn resolve_apps(
    executor: &ScriptExecutor,
    device: Option<&str>,
    apps: &[String],
) -> Result<Vec<String>, CommandError> {
    let resolved = if is_wildcard(apps) {
        executor
            .bridge()
            .list_installed_packages(device)
            .await
            .map_err(|e| CommandError::backend("adb", e))?
    } else {
        apps.to_vec()
    };
    Ok(resolved.into_iter().filter(|a| !a.is_empty()).collect())
}

fn enter_device(executor: &mut ScriptExecutor, device: &str) {
    executor.variables_mut().capture(DEVICE_ID, device);
}

fn device_context(device: &str) -> ExecutionContext {
    ExecutionContext {
        device_id: Some(device.to_string()),
        ..Default::default()
    }
}

async fn run_target(executor: &mut ScriptExecutor, ctx: ExecutionContext) {
    executor
        .emitter()
        .emit(EngineEvent::TargetStarted { target: ctx.label() });
    executor.execute_all(&ctx).await;
}

fn fail_target(executor: &mut ScriptExecutor, target: TargetLabel, err: &CommandError) {
    log::warn!("Skipping {}: {}", target, err);
    executor.emitter().emit(EngineEvent::TargetSkipped {
        target: target.clone(),
        reason: err.to_string(),
    });
    executor.state_mut().record_target_failure(target, err);
}
