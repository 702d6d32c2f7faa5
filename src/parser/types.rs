use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which operation a raw command string selects, decided by its prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Block,
    Sleep,
    Print,
    Frida,
    Write,
    Append,
    Read,
    Reverse,
    Capture,
    Shell,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Block => "block",
            CommandKind::Sleep => "sleep",
            CommandKind::Print => "print",
            CommandKind::Frida => "frida",
            CommandKind::Write => "write",
            CommandKind::Append => "append",
            CommandKind::Read => "read",
            CommandKind::Reverse => "reverse",
            CommandKind::Capture => "capture",
            CommandKind::Shell => "shell",
        }
    }

    /// Operations that call out to a shell or a backend and so run under the
    /// per-command timeout
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            CommandKind::Frida | CommandKind::Reverse | CommandKind::Capture | CommandKind::Shell
        )
    }
}

/// A fully interpreted command, operands already substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Block {
        name: String,
    },
    Sleep {
        seconds: u64,
    },
    Print {
        text: String,
    },
    Frida {
        script_path: PathBuf,
        package_id: String,
    },
    Write {
        path: PathBuf,
        data: String,
    },
    Append {
        path: PathBuf,
        data: String,
    },
    Read {
        path: PathBuf,
        token: String,
    },
    Reverse {
        apk_path: PathBuf,
        params: Vec<ReverseParam>,
    },
    Capture {
        token: String,
        command: String,
    },
    Shell {
        command: String,
    },
}

impl Operation {
    pub fn kind(&self) -> CommandKind {
        match self {
            Operation::Block { .. } => CommandKind::Block,
            Operation::Sleep { .. } => CommandKind::Sleep,
            Operation::Print { .. } => CommandKind::Print,
            Operation::Frida { .. } => CommandKind::Frida,
            Operation::Write { .. } => CommandKind::Write,
            Operation::Append { .. } => CommandKind::Append,
            Operation::Read { .. } => CommandKind::Read,
            Operation::Reverse { .. } => CommandKind::Reverse,
            Operation::Capture { .. } => CommandKind::Capture,
            Operation::Shell { .. } => CommandKind::Shell,
        }
    }
}

/// Sub-operation of `reverse:`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReverseParam {
    /// Metadata dump to `<apk>-apk-info.json`
    Info,
    /// Method table dump to `<apk>-decompiled.txt`
    Decompile,
    /// Decoded manifest to `<apk>-AndroidManifest.xml`
    Manifest,
    /// Repackaged archive at `<apk>.zip`
    Zip,
}

impl ReverseParam {
    /// Output file for this sub-operation next to the APK
    pub fn output_path(&self, apk_path: &std::path::Path) -> PathBuf {
        let base = apk_path.as_os_str().to_string_lossy();
        let path = match self {
            ReverseParam::Info => format!("{}-apk-info.json", base),
            ReverseParam::Decompile => format!("{}-decompiled.txt", base),
            ReverseParam::Manifest => format!("{}-AndroidManifest.xml", base),
            ReverseParam::Zip => format!("{}.zip", base),
        };
        PathBuf::from(path)
    }
}

impl FromStr for ReverseParam {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "info" => Ok(ReverseParam::Info),
            "decompile" => Ok(ReverseParam::Decompile),
            "manifest" => Ok(ReverseParam::Manifest),
            "zip" => Ok(ReverseParam::Zip),
            other => Err(format!("unknown reverse parameter '{}'", other)),
        }
    }
}

impl fmt::Display for ReverseParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReverseParam::Info => "info",
            ReverseParam::Decompile => "decompile",
            ReverseParam::Manifest => "manifest",
            ReverseParam::Zip => "zip",
        };
        f.write_str(name)
    }
}
