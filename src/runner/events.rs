use super::state::{RunSummary, TargetLabel};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Engine execution events for real-time updates
#[derive(Debug, Clone)]
pub enum EngineEvent {
    // Run events
    RunStarted {
        run_id: String,
        script: String,
    },
    RunFinished {
        summary: RunSummary,
    },

    // Target events
    TargetStarted {
        target: TargetLabel,
    },
    TargetSkipped {
        target: TargetLabel,
        reason: String,
    },

    // Block events
    BlockStarted {
        block: String,
        command_count: usize,
        depth: usize,
    },
    BlockFinished {
        block: String,
        failed: u32,
        duration_ms: u64,
        depth: usize,
    },

    // Command events
    CommandStarted {
        block: String,
        index: usize,
        command: String,
        depth: usize,
    },
    CommandPassed {
        block: String,
        index: usize,
        duration_ms: u64,
        depth: usize,
    },
    CommandFailed {
        block: String,
        index: usize,
        command: String,
        error: String,
        duration_ms: u64,
        depth: usize,
    },
    CommandSkipped {
        block: String,
        index: usize,
        reason: String,
        depth: usize,
    },

    /// Text from a `print:` command
    Print {
        text: String,
        depth: usize,
    },

    // Log event for coordinated output
    Log {
        message: String,
        depth: usize,
    },
}

/// Event emitter for broadcasting engine events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<EngineEvent>) {
        let (sender, receiver) = broadcast::channel(1024);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<EngineEvent>) {
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        // Spinners only make sense on a terminal
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let mut spinners: Vec<Option<ProgressBar>> = Vec::new();
        let mut command_texts: Vec<String> = Vec::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("console listener dropped {} events", missed);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                EngineEvent::RunStarted { run_id, script } => {
                    multi
                        .println(format!(
                            "\n{} Run {} started: {}",
                            "▶".green().bold(),
                            run_id.dimmed(),
                            script.cyan()
                        ))
                        .ok();
                }

                EngineEvent::RunFinished { summary } => {
                    for pb in spinners.drain(..).flatten() {
                        pb.finish();
                    }

                    println!("\n{} Run finished", "■".blue().bold());
                    println!("  Total commands: {}", summary.total_commands);
                    println!(
                        "  {} passed, {} failed, {} skipped",
                        summary.passed.to_string().green(),
                        summary.failed.to_string().red(),
                        summary.skipped.to_string().yellow()
                    );
                    if summary.target_failures > 0 {
                        println!(
                            "  {} target(s) could not be resolved",
                            summary.target_failures.to_string().red()
                        );
                    }
                    if let Some(duration) = summary.total_duration_ms {
                        println!("  Duration: {}ms", duration);
                    }
                }

                EngineEvent::TargetStarted { target } => {
                    multi
                        .println(format!("\n{} Target: {}", "◆".magenta(), target.to_string().bold()))
                        .ok();
                }

                EngineEvent::TargetSkipped { target, reason } => {
                    multi
                        .println(format!(
                            "{} Skipping target {}: {}",
                            "○".yellow(),
                            target,
                            reason.dimmed()
                        ))
                        .ok();
                }

                EngineEvent::BlockStarted {
                    block,
                    command_count,
                    depth,
                } => {
                    // Stop ticking the `block:` command spinners of the callers
                    for pb in spinners.iter_mut().take(depth).flatten() {
                        pb.finish();
                    }
                    let indent = "    ".repeat(depth);
                    multi
                        .println(format!(
                            "{}  {} Block: {} ({} commands)",
                            indent,
                            "→".blue(),
                            block.white().bold(),
                            command_count
                        ))
                        .ok();
                }

                EngineEvent::BlockFinished {
                    block,
                    failed,
                    duration_ms,
                    depth,
                } => {
                    let indent = "    ".repeat(depth);
                    let status = if failed == 0 {
                        "OK".green().bold()
                    } else {
                        format!("{} FAILED", failed).red().bold()
                    };
                    multi
                        .println(format!(
                            "{}  {} Block {} [{}] {}ms",
                            indent,
                            "←".blue(),
                            block,
                            status,
                            duration_ms
                        ))
                        .ok();
                }

                EngineEvent::CommandStarted {
                    index,
                    command,
                    depth,
                    ..
                } => {
                    if depth >= spinners.len() {
                        spinners.resize(depth + 1, None);
                        command_texts.resize(depth + 1, String::new());
                    }

                    let pb = multi.add(ProgressBar::new_spinner());
                    let indent = "    ".repeat(depth);
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template(&format!("{}    {{spinner}} {{msg}}", indent))
                    {
                        pb.set_style(style);
                    }

                    let body = format!("[{}] {} ", index, command.dimmed());
                    pb.set_message(body.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));

                    spinners[depth] = Some(pb);
                    command_texts[depth] = body;
                }

                EngineEvent::CommandPassed {
                    duration_ms, depth, ..
                } => {
                    if depth < spinners.len() {
                        let indent = "    ".repeat(depth);
                        if let Some(pb) = spinners[depth].take() {
                            pb.finish_and_clear();
                        }
                        multi
                            .println(format!(
                                "{}    {} {}({}ms)",
                                indent,
                                "✓".green(),
                                command_texts[depth],
                                duration_ms
                            ))
                            .ok();
                    }
                }

                EngineEvent::CommandFailed {
                    command,
                    error,
                    duration_ms,
                    depth,
                    ..
                } => {
                    let indent = "    ".repeat(depth);
                    if let Some(pb) = spinners.get_mut(depth).and_then(Option::take) {
                        pb.finish_and_clear();
                    }
                    multi
                        .println(format!(
                            "{}    {} Command {} failed ({}ms)\n{}        {}",
                            indent,
                            "✗".red(),
                            command.bold(),
                            duration_ms,
                            indent,
                            error.red()
                        ))
                        .ok();
                }

                EngineEvent::CommandSkipped {
                    index,
                    reason,
                    depth,
                    ..
                } => {
                    let indent = "    ".repeat(depth);
                    multi
                        .println(format!(
                            "{}    {} [{}] skipped ({})",
                            indent,
                            "○".yellow(),
                            index,
                            reason.dimmed()
                        ))
                        .ok();
                }

                EngineEvent::Print { text, depth } => {
                    let indent = "    ".repeat(depth);
                    multi.println(format!("{}      {}", indent, text)).ok();
                }

                EngineEvent::Log { message, depth } => {
                    let indent = "    ".repeat(depth);
                    multi
                        .println(format!("{}      {}", indent, message.dimmed()))
                        .ok();
                }
            }
        }

        for pb in spinners.into_iter().flatten() {
            pb.finish_and_clear();
        }
    }
}
