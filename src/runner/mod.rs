pub mod blocks;
pub mod error;
pub mod events;
pub mod executor;
pub mod state;
pub mod targets;
pub mod variables;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::parser::script::{parse_script_file, Script};
use crate::utils::config::Config;

pub use events::*;
pub use executor::{Backends, ScriptExecutor};
pub use state::*;
use variables::{VariableTable, RESERVED_TOKENS};

/// Load a script file and run it against its targets
pub async fn run_script(
    path: &Path,
    config: &Config,
    backends: Backends,
    cancel: Arc<AtomicBool>,
) -> Result<RunReport> {
    let script = parse_script_file(path)
        .with_context(|| format!("Failed to load script {}", path.display()))?;
    run_loaded(script, &path.display().to_string(), config, backends, cancel).await
}

/// Run an already loaded script
pub async fn run_loaded(
    script: Script,
    name: &str,
    config: &Config,
    backends: Backends,
    cancel: Arc<AtomicBool>,
) -> Result<RunReport> {
    warn_suspicious(&script);
    log::debug!(
        "Loaded {}: {} block(s), devices {:?}{}, apps {:?}{}",
        name,
        script.blocks.len(),
        script.devices,
        if script.uses_device_wildcard() { " (all connected)" } else { "" },
        script.apps,
        if script.uses_app_wildcard() { " (all installed)" } else { "" },
    );

    let (emitter, receiver) = EventEmitter::new();
    let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

    let Script {
        devices,
        apps,
        variables,
        blocks,
    } = script;

    let mut executor = ScriptExecutor::new(
        backends,
        blocks,
        VariableTable::new(variables),
        emitter,
        config.clone(),
        cancel,
    );

    executor.state_mut().start();
    let run_id = executor.state().run_id.clone();
    executor.emitter().emit(EngineEvent::RunStarted {
        run_id,
        script: name.to_string(),
    });

    targets::drive(&mut executor, &devices, &apps).await;

    if executor.is_cancelled() {
        executor.state_mut().cancelled = true;
    }
    executor.state_mut().finish();
    for record in executor.state().failures() {
        log::info!(
            "Failed on {}: {}[{}] '{}'",
            record.target,
            record.block,
            record.index,
            record.command
        );
    }
    let summary = executor.state().summary();
    executor
        .emitter()
        .emit(EngineEvent::RunFinished { summary });

    let report = executor.state().to_report(name);

    // Closing the channel lets the listener drain and exit
    drop(executor);
    listener.await.context("Console listener panicked")?;

    Ok(report)
}

fn warn_suspicious(script: &Script) {
    let mut tokens: HashMap<String, String> = script.variables.clone();
    for token in RESERVED_TOKENS {
        tokens.insert(token.to_string(), String::new());
    }
    for (inner, outer) in VariableTable::new(tokens).overlapping_tokens() {
        log::warn!(
            "Token '{}' is contained in '{}'; '{}' is substituted first",
            inner,
            outer,
            outer
        );
    }

    for (block, target) in script.blocks.dangling_references() {
        log::warn!("Block '{}' references unknown block '{}'", block, target);
    }
}
