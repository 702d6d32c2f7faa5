use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::blocks::BlockRegistry;
use super::error::CommandError;
use super::events::{EngineEvent, EventEmitter};
use super::state::{CommandRecord, CommandStatus, RunState};
use super::targets::ExecutionContext;
use super::variables::VariableTable;
use crate::driver::apk::dex;
use crate::driver::traits::{ApkAnalyzer, DeviceBridge, Instrumentation};
use crate::parser::command::parse_command;
use crate::parser::types::{Operation, ReverseParam};
use crate::utils::config::Config;

/// External collaborators used by the interpreter
#[derive(Clone)]
pub struct Backends {
    pub bridge: Arc<dyn DeviceBridge>,
    pub instrumentation: Arc<dyn Instrumentation>,
    pub apk: Arc<dyn ApkAnalyzer>,
}

/// Block interpreter.
///
/// Every command runs inside its own failure boundary: an error is recorded
/// and reported, then execution moves on to the next command of the same
/// block.
pub struct ScriptExecutor {
    backends: Backends,
    registry: BlockRegistry,
    variables: VariableTable,
    emitter: EventEmitter,
    state: RunState,
    config: Config,
    cancel: Arc<AtomicBool>,
    /// Blocks currently executing, outermost first
    call_stack: Vec<String>,
}

impl ScriptExecutor {
    pub fn new(
        backends: Backends,
        registry: BlockRegistry,
        variables: VariableTable,
        emitter: EventEmitter,
        config: Config,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            backends,
            registry,
            variables,
            emitter,
            state: RunState::new(&Uuid::new_v4().to_string()),
            config,
            cancel,
            call_stack: Vec::new(),
        }
    }

    pub fn bridge(&self) -> &dyn DeviceBridge {
        self.backends.bridge.as_ref()
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableTable {
        &mut self.variables
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run every registered block once, in registration order
    pub async fn execute_all(&mut self, ctx: &ExecutionContext) {
        let names: Vec<String> = self.registry.names().map(str::to_string).collect();
        for name in names {
            if let Err(e) = self.execute(&name, ctx).await {
                log::warn!("Block '{}' could not run: {}", name, e);
            }
        }
    }

    /// Run a single named block.
    ///
    /// Only fails when the block itself cannot be entered; failures of the
    /// commands inside are recorded, never returned.
    pub async fn execute(&mut self, block: &str, ctx: &ExecutionContext) -> Result<(), CommandError> {
        self.execute_block(block, ctx, 0).await
    }

    async fn execute_block(
        &mut self,
        block: &str,
        ctx: &ExecutionContext,
        depth: usize,
    ) -> Result<(), CommandError> {
        if let Some(pos) = self.call_stack.iter().position(|n| n == block) {
            let mut chain = self.call_stack[pos..].to_vec();
            chain.push(block.to_string());
            return Err(CommandError::RecursiveBlock(chain));
        }
        let commands = self
            .registry
            .get(block)
            .ok_or_else(|| CommandError::UnknownBlock(block.to_string()))?
            .to_vec();

        self.call_stack.push(block.to_string());
        self.emitter.emit(EngineEvent::BlockStarted {
            block: block.to_string(),
            command_count: commands.len(),
            depth,
        });

        let started = Instant::now();
        let mut failed = 0;

        for (index, raw) in commands.iter().enumerate() {
            if self.is_cancelled() {
                self.skip(ctx, block, index, depth, raw, "cancelled");
                continue;
            }

            self.emitter.emit(EngineEvent::CommandStarted {
                block: block.to_string(),
                index,
                command: raw.clone(),
                depth,
            });

            let command_started = Instant::now();
            let result = self.run_command(raw, ctx, depth).await;
            let duration_ms = command_started.elapsed().as_millis() as u64;

            let status = match result {
                Ok(()) => {
                    self.emitter.emit(EngineEvent::CommandPassed {
                        block: block.to_string(),
                        index,
                        duration_ms,
                        depth,
                    });
                    CommandStatus::Passed
                }
                Err(CommandError::Cancelled) => {
                    self.emitter.emit(EngineEvent::CommandSkipped {
                        block: block.to_string(),
                        index,
                        reason: "cancelled".to_string(),
                        depth,
                    });
                    CommandStatus::Skipped {
                        reason: "cancelled".to_string(),
                    }
                }
                Err(e) => {
                    failed += 1;
                    log::debug!("Command {} failed: {}", raw, e);
                    self.emitter.emit(EngineEvent::CommandFailed {
                        block: block.to_string(),
                        index,
                        command: raw.clone(),
                        error: e.to_string(),
                        duration_ms,
                        depth,
                    });
                    CommandStatus::Failed {
                        kind: e.kind(),
                        error: e.to_string(),
                    }
                }
            };

            self.state.record(CommandRecord {
                target: ctx.label(),
                block: block.to_string(),
                index,
                depth,
                command: raw.clone(),
                status,
                duration_ms,
            });
        }

        self.call_stack.pop();
        self.emitter.emit(EngineEvent::BlockFinished {
            block: block.to_string(),
            failed,
            duration_ms: started.elapsed().as_millis() as u64,
            depth,
        });

        Ok(())
    }

    fn skip(
        &mut self,
        ctx: &ExecutionContext,
        block: &str,
        index: usize,
        depth: usize,
        raw: &str,
        reason: &str,
    ) {
        self.emitter.emit(EngineEvent::CommandSkipped {
            block: block.to_string(),
            index,
            reason: reason.to_string(),
            depth,
        });
        self.state.record(CommandRecord {
            target: ctx.label(),
            block: block.to_string(),
            index,
            depth,
            command: raw.to_string(),
            status: CommandStatus::Skipped {
                reason: reason.to_string(),
            },
            duration_ms: 0,
        });
    }

    /// Parse, substitute and dispatch one raw command
    async fn run_command(
        &mut self,
        raw: &str,
        ctx: &ExecutionContext,
        depth: usize,
    ) -> Result<(), CommandError> {
        let operation = parse_command(raw, |text| self.variables.substitute(text))?;

        match self.config.command_timeout {
            Some(limit) if operation.kind().is_external() => {
                tokio::time::timeout(limit, self.dispatch(operation, ctx, depth))
                    .await
                    .map_err(|_| CommandError::Timeout(limit))?
            }
            _ => self.dispatch(operation, ctx, depth).await,
        }
    }

    async fn dispatch(
        &mut self,
        operation: Operation,
        ctx: &ExecutionContext,
        depth: usize,
    ) -> Result<(), CommandError> {
        match operation {
            Operation::Block { name } => Box::pin(self.execute_block(&name, ctx, depth + 1)).await,

            Operation::Sleep { seconds } => self.sleep(Duration::from_secs(seconds)).await,

            Operation::Print { text } => {
                self.emitter.emit(EngineEvent::Print { text, depth });
                Ok(())
            }

            Operation::Write { path, data } => tokio::fs::write(&path, data)
                .await
                .map_err(io_error("write", &path)),

            Operation::Append { path, data } => {
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await
                    .map_err(io_error("append", &path))?;
                file.write_all(format!("{}\n", data).as_bytes())
                    .await
                    .map_err(io_error("append", &path))?;
                file.flush().await.map_err(io_error("append", &path))
            }

            Operation::Read { path, token } => {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(io_error("read", &path))?;
                self.variables.capture(&token, content);
                Ok(())
            }

            Operation::Capture { token, command } => {
                let lines = self.shell(&command).await?;
                self.variables.capture(&token, lines.concat());
                Ok(())
            }

            Operation::Shell { command } => {
                let lines = self.shell(&command).await?;
                let message = match lines.iter().find(|l| !l.trim().is_empty()) {
                    Some(first) => format!("Result: '{}'...", first),
                    None => "No response from command".to_string(),
                };
                self.emitter.emit(EngineEvent::Log { message, depth });
                Ok(())
            }

            Operation::Frida {
                script_path,
                package_id,
            } => self.frida(&script_path, &package_id, ctx, depth).await,

            Operation::Reverse { apk_path, params } => {
                let analyzer = Arc::clone(&self.backends.apk);
                let written = tokio::task::spawn_blocking(move || {
                    reverse_apk(analyzer.as_ref(), &apk_path, &params)
                })
                .await
                .map_err(|e| CommandError::backend("apk", e.into()))?
                .map_err(|e| CommandError::backend("apk", e))?;

                for path in written {
                    self.emitter.emit(EngineEvent::Log {
                        message: format!("{} {}", "Wrote".green(), path.display()),
                        depth,
                    });
                }
                Ok(())
            }
        }
    }

    async fn shell(&self, command: &str) -> Result<Vec<String>, CommandError> {
        log::debug!("Run command: '{}'", command);
        self.backends
            .bridge
            .run_shell(None, command)
            .await
            .map_err(|e| CommandError::Shell(format!("'{}': {:#}", command, e)))
    }

    async fn frida(
        &mut self,
        script_path: &Path,
        package_id: &str,
        ctx: &ExecutionContext,
        depth: usize,
    ) -> Result<(), CommandError> {
        let source = tokio::fs::read_to_string(script_path)
            .await
            .map_err(io_error("read", script_path))?;
        let source = self.variables.substitute(&source);

        let mut session = self
            .backends
            .instrumentation
            .attach(ctx.device_id.as_deref(), package_id)
            .await
            .map_err(|e| CommandError::backend("frida", e))?;
        let messages = session
            .load_script(&source)
            .await
            .map_err(|e| CommandError::backend("frida", e))?;

        for message in messages {
            self.emitter.emit(EngineEvent::Log { message, depth });
        }
        Ok(())
    }

    /// Sleep in short slices so a cancel request is noticed promptly
    async fn sleep(&self, duration: Duration) -> Result<(), CommandError> {
        let slice = Duration::from_millis(self.config.sleep_poll_ms.max(1));
        let deadline = tokio::time::Instant::now()
            .checked_add(duration)
            .ok_or_else(|| CommandError::InvalidSleep(duration.as_secs().to_string()))?;
        loop {
            if self.is_cancelled() {
                return Err(CommandError::Cancelled);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep(slice.min(deadline - now)).await;
        }
    }
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> CommandError {
    let path = path.to_path_buf();
    move |source| CommandError::Io {
        action,
        path,
        source,
    }
}

/// Run the requested analyses for one APK, returning the files written
fn reverse_apk(
    analyzer: &dyn ApkAnalyzer,
    apk: &Path,
    params: &[ReverseParam],
) -> anyhow::Result<Vec<PathBuf>> {
    use anyhow::Context;

    let mut written = Vec::new();
    for param in params {
        let out = param.output_path(apk);
        match param {
            ReverseParam::Info => {
                let info = analyzer.info(apk)?;
                std::fs::write(&out, serde_json::to_vec_pretty(&info)?)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
            }
            ReverseParam::Manifest => {
                let xml = analyzer.manifest(apk)?;
                std::fs::write(&out, xml)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
            }
            ReverseParam::Decompile => {
                let methods = analyzer.decompile(apk)?;
                std::fs::write(&out, dex::render_listing(&methods))
                    .with_context(|| format!("Failed to write {}", out.display()))?;
            }
            ReverseParam::Zip => analyzer.repackage(apk, &out)?,
        }
        written.push(out);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::apk::fixtures::{oversized_dex, write_apk, write_sample_apk};
    use crate::driver::fake::{self, FakeBridge};
    use crate::runner::error::ErrorKind;
    use std::collections::HashMap;

    fn executor(blocks: &[(&str, &[&str])], bridge: FakeBridge) -> ScriptExecutor {
        executor_with(blocks, bridge, Config::default())
    }

    fn executor_with(blocks: &[(&str, &[&str])], bridge: FakeBridge, config: Config) -> ScriptExecutor {
        let mut registry = BlockRegistry::new();
        for (name, commands) in blocks {
            registry.insert(name, commands.iter().map(|c| c.to_string()).collect());
        }
        let (backends, _, _) = fake::backends(bridge);
        ScriptExecutor::new(
            backends,
            registry,
            VariableTable::new(HashMap::new()),
            EventEmitter::default(),
            config,
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn prints(receiver: &mut tokio::sync::broadcast::Receiver<EngineEvent>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            if let EngineEvent::Print { text, .. } = event {
                out.push(text);
            }
        }
        out
    }

    fn statuses(exec: &ScriptExecutor) -> Vec<(String, CommandStatus)> {
        exec.state()
            .records
            .iter()
            .map(|r| (r.command.clone(), r.status.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_failing_command_does_not_stop_block() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("after.txt");
        let write = format!("write:{};done", out.display());
        let mut exec = executor(
            &[("main", &["sleep:abc", "read:/definitely/missing;x", write.as_str()])],
            FakeBridge::default(),
        );

        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "done");
        let failures: Vec<ErrorKind> = exec
            .state()
            .failures()
            .map(|r| match &r.status {
                CommandStatus::Failed { kind, .. } => *kind,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(failures, vec![ErrorKind::InvalidOperand, ErrorKind::Io]);
        assert_eq!(exec.state().summary().passed, 1);
    }

    #[tokio::test]
    async fn test_nested_block_matches_inlined() {
        let mut nested = executor(
            &[("main", &["block:other", "print:after"]), ("other", &["print:hi"])],
            FakeBridge::default(),
        );
        let mut rx = nested.emitter().subscribe();
        nested.execute("main", &ExecutionContext::default()).await.unwrap();

        let mut inlined = executor(&[("main", &["print:hi", "print:after"])], FakeBridge::default());
        let mut rx_inlined = inlined.emitter().subscribe();
        inlined.execute("main", &ExecutionContext::default()).await.unwrap();

        assert_eq!(prints(&mut rx), prints(&mut rx_inlined));
    }

    #[tokio::test]
    async fn test_recursive_block_fails_command_only() {
        let mut exec = executor(
            &[("a", &["block:b", "print:end"]), ("b", &["block:a"])],
            FakeBridge::default(),
        );
        let mut rx = exec.emitter().subscribe();
        exec.execute("a", &ExecutionContext::default()).await.unwrap();

        let failed: Vec<&CommandRecord> = exec.state().failures().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].block, "b");
        assert_eq!(
            failed[0].status,
            CommandStatus::Failed {
                kind: ErrorKind::RecursiveBlock,
                error: "recursive block reference: a -> b -> a".into(),
            }
        );
        assert_eq!(prints(&mut rx), vec!["end"]);
    }

    #[tokio::test]
    async fn test_unknown_block() {
        let mut exec = executor(&[("main", &["block: nope"])], FakeBridge::default());
        exec.execute("main", &ExecutionContext::default()).await.unwrap();
        assert!(matches!(
            exec.state().records[0].status,
            CommandStatus::Failed {
                kind: ErrorKind::UnknownBlock,
                ..
            }
        ));
        assert!(exec.execute("missing", &ExecutionContext::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_capture_substitutes_later_commands() {
        let bridge = FakeBridge::default().with_output("echo hello", &["hello"]);
        let mut exec = executor(&[("main", &["?x echo hello", "print:got x"])], bridge);
        let mut rx = exec.emitter().subscribe();
        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        assert_eq!(exec.variables().get("x"), Some("hello"));
        assert_eq!(prints(&mut rx), vec!["got hello"]);
    }

    #[tokio::test]
    async fn test_capture_concatenates_lines() {
        let bridge = FakeBridge::default().with_output("ls", &["a", "b", ""]);
        let mut exec = executor(&[("main", &["?files ls"])], bridge);
        exec.execute("main", &ExecutionContext::default()).await.unwrap();
        assert_eq!(exec.variables().get("files"), Some("ab"));
    }

    #[tokio::test]
    async fn test_shell_receives_substituted_text() {
        let (backends, bridge, _) = fake::backends(FakeBridge::default());
        let mut exec = ScriptExecutor::new(
            backends,
            BlockRegistry::single(vec!["!adb_connect shell ls".into()]),
            VariableTable::default(),
            EventEmitter::default(),
            Config::default(),
            Arc::new(AtomicBool::new(false)),
        );
        exec.variables_mut().capture("!adb_connect", "adb -s !device_id");
        exec.variables_mut().capture("!device_id", "d1");

        exec.execute("main", &ExecutionContext::default()).await.unwrap();
        assert_eq!(bridge.commands(), vec!["adb -s d1 shell ls"]);
    }

    #[tokio::test]
    async fn test_shell_failure_is_recorded() {
        let bridge = FakeBridge::default().failing("false");
        let mut exec = executor(&[("main", &["false", "print:still here"])], bridge);
        let mut rx = exec.emitter().subscribe();
        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        assert!(matches!(
            statuses(&exec)[0].1,
            CommandStatus::Failed {
                kind: ErrorKind::Shell,
                ..
            }
        ));
        assert_eq!(prints(&mut rx), vec!["still here"]);
    }

    #[tokio::test]
    async fn test_write_append_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        let f = file.display().to_string();
        let write = format!("write:{};first", f);
        let append = format!("append:{};second", f);
        let read = format!("read:{};notes", f);
        let mut exec = executor(&[("main", &[write.as_str(), append.as_str(), read.as_str()])], FakeBridge::default());

        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        assert_eq!(exec.state().failures().count(), 0);
        assert_eq!(exec.variables().get("notes"), Some("firstsecond\n"));
    }

    #[tokio::test]
    async fn test_read_into_reserved_token_rejected() {
        let mut exec = executor(&[("main", &["read:/tmp/x;!device_id"])], FakeBridge::default());
        exec.execute("main", &ExecutionContext::default()).await.unwrap();
        assert!(matches!(
            statuses(&exec)[0].1,
            CommandStatus::Failed {
                kind: ErrorKind::ReservedToken,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_reverse_writes_requested_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app.apk");
        write_sample_apk(&apk);
        let info = format!("reverse:{};info,manifest", apk.display());
        let zip = format!("reverse:{}", apk.display());
        let mut exec = executor(&[("main", &[info.as_str(), zip.as_str()])], FakeBridge::default());

        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        assert_eq!(exec.state().failures().count(), 0);
        let info_json = std::fs::read_to_string(dir.path().join("app.apk-apk-info.json")).unwrap();
        assert!(info_json.contains("\"package\": \"com.example.app\""));
        let manifest = std::fs::read_to_string(dir.path().join("app.apk-AndroidManifest.xml")).unwrap();
        assert!(manifest.contains("<manifest"));
        assert!(dir.path().join("app.apk.zip").exists());
        assert!(!dir.path().join("app.apk-decompiled.txt").exists());
    }

    #[tokio::test]
    async fn test_reverse_decompile_listing() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app.apk");
        write_sample_apk(&apk);
        let cmd = format!("reverse:{};decompile", apk.display());
        let mut exec = executor(&[("main", &[cmd.as_str()])], FakeBridge::default());

        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        let listing = std::fs::read_to_string(dir.path().join("app.apk-decompiled.txt")).unwrap();
        assert!(listing.contains("LFoo;->bar(I)V"));
    }

    #[tokio::test]
    async fn test_malformed_dex_fails_only_its_command() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("bad.apk");
        write_apk(&apk, &[("classes.dex", &oversized_dex())]);
        let cmd = format!("reverse:{};decompile", apk.display());
        let mut exec = executor(&[("main", &[cmd.as_str(), "print:after"])], FakeBridge::default());
        let mut rx = exec.emitter().subscribe();

        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        assert!(matches!(
            statuses(&exec)[0].1,
            CommandStatus::Failed {
                kind: ErrorKind::Backend,
                ..
            }
        ));
        assert_eq!(statuses(&exec)[1].1, CommandStatus::Passed);
        assert_eq!(prints(&mut rx), vec!["after"]);
        assert!(!dir.path().join("bad.apk-decompiled.txt").exists());
    }

    #[tokio::test]
    async fn test_frida_loads_substituted_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("hook.js");
        std::fs::write(&script, "send('!app_id');").unwrap();
        let cmd = format!("frida:{};!app_id", script.display());

        let (backends, _, instrumentation) = fake::backends(FakeBridge::default());
        let mut exec = ScriptExecutor::new(
            backends,
            BlockRegistry::single(vec![cmd]),
            VariableTable::default(),
            EventEmitter::default(),
            Config::default(),
            Arc::new(AtomicBool::new(false)),
        );
        exec.variables_mut().capture("!app_id", "com.example");
        let ctx = ExecutionContext {
            device_id: Some("d1".into()),
            ..Default::default()
        };

        exec.execute("main", &ctx).await.unwrap();

        assert_eq!(exec.state().failures().count(), 0);
        assert_eq!(
            instrumentation.loaded(),
            vec![(
                Some("d1".to_string()),
                "com.example".to_string(),
                "send('com.example');".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_timeout_applies_to_external_commands() {
        let bridge = FakeBridge::default().hanging("slow");
        let config = Config {
            command_timeout: Some(Duration::from_millis(50)),
            ..Config::default()
        };
        let mut exec = executor_with(&[("main", &["slow", "print:next"])], bridge, config);
        let mut rx = exec.emitter().subscribe();

        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        assert!(matches!(
            statuses(&exec)[0].1,
            CommandStatus::Failed {
                kind: ErrorKind::Timeout,
                ..
            }
        ));
        assert_eq!(prints(&mut rx), vec!["next"]);
    }

    #[tokio::test]
    async fn test_cancel_skips_remaining_commands() {
        let mut exec = executor(&[("main", &["print:a", "print:b"])], FakeBridge::default());
        exec.cancel.store(true, Ordering::SeqCst);

        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        let summary = exec.state().summary();
        assert_eq!((summary.passed, summary.skipped), (0, 2));
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_cancel() {
        let config = Config {
            sleep_poll_ms: 5,
            ..Config::default()
        };
        let mut exec = executor_with(&[("main", &["sleep:30"])], FakeBridge::default(), config);
        let cancel = Arc::clone(&exec.cancel);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(
            statuses(&exec)[0].1,
            CommandStatus::Skipped {
                reason: "cancelled".into()
            }
        );
    }

    #[tokio::test]
    async fn test_sleep_beyond_clock_range_is_invalid() {
        let mut exec = executor(
            &[("main", &["sleep:18446744073709551615", "print:after"])],
            FakeBridge::default(),
        );
        let mut rx = exec.emitter().subscribe();

        exec.execute("main", &ExecutionContext::default()).await.unwrap();

        assert!(matches!(
            statuses(&exec)[0].1,
            CommandStatus::Failed {
                kind: ErrorKind::InvalidOperand,
                ..
            }
        ));
        assert_eq!(prints(&mut rx), vec!["after"]);
    }
}
