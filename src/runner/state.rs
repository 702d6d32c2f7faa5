use super::error::{CommandError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Outcome of one executed command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandStatus {
    Passed,
    Failed { kind: ErrorKind, error: String },
    Skipped { reason: String },
}

/// Device/app pair a command ran against
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetLabel {
    pub device_id: Option<String>,
    pub app_id: Option<String>,
}

impl std::fmt::Display for TargetLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.device_id, &self.app_id) {
            (Some(d), Some(a)) => write!(f, "{} / {}", d, a),
            (Some(d), None) => write!(f, "{}", d),
            (None, Some(a)) => write!(f, "{}", a),
            (None, None) => write!(f, "host"),
        }
    }
}

/// Report entry for a single command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub target: TargetLabel,
    pub block: String,
    pub index: usize,
    pub depth: usize,
    pub command: String,
    pub status: CommandStatus,
    pub duration_ms: u64,
}

impl CommandRecord {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, CommandStatus::Failed { .. })
    }
}

/// Failure to resolve a device or app for an iteration step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetFailure {
    pub target: TargetLabel,
    pub kind: ErrorKind,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub total_commands: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub target_failures: u32,
    pub total_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub script: String,
    pub generated_at: String,
    pub cancelled: bool,
    pub commands: Vec<CommandRecord>,
    pub target_failures: Vec<TargetFailure>,
    pub summary: RunSummary,
}

/// Accumulates command outcomes over a run
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: String,
    pub records: Vec<CommandRecord>,
    pub target_failures: Vec<TargetFailure>,
    pub cancelled: bool,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl RunState {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            records: Vec::new(),
            target_failures: Vec::new(),
            cancelled: false,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Instant::now());
    }

    pub fn record(&mut self, record: CommandRecord) {
        self.records.push(record);
    }

    pub fn record_target_failure(&mut self, target: TargetLabel, err: &CommandError) {
        self.target_failures.push(TargetFailure {
            target,
            kind: err.kind(),
            error: err.to_string(),
        });
    }

    /// Records that failed, in execution order
    pub fn failures(&self) -> impl Iterator<Item = &CommandRecord> {
        self.records.iter().filter(|r| r.is_failed())
    }

    pub fn summary(&self) -> RunSummary {
        let (passed, failed, skipped) =
            self.records
                .iter()
                .fold((0, 0, 0), |(p, f, s), r| match r.status {
                    CommandStatus::Passed => (p + 1, f, s),
                    CommandStatus::Failed { .. } => (p, f + 1, s),
                    CommandStatus::Skipped { .. } => (p, f, s + 1),
                });

        let total_duration_ms = self.started_at.map(|start| {
            self.finished_at
                .unwrap_or_else(Instant::now)
                .duration_since(start)
                .as_millis() as u64
        });

        RunSummary {
            run_id: self.run_id.clone(),
            total_commands: self.records.len() as u32,
            passed,
            failed,
            skipped,
            target_failures: self.target_failures.len() as u32,
            total_duration_ms,
        }
    }

    /// Serialize state for reporting
    pub fn to_report(&self, script: &str) -> RunReport {
        RunReport {
            run_id: self.run_id.clone(),
            script: script.to_string(),
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            cancelled: self.cancelled,
            commands: self.records.clone(),
            target_failures: self.target_failures.clone(),
            summary: self.summary(),
        }
    }
}
