use super::types::{CommandKind, Operation, ReverseParam};
use crate::runner::error::CommandError;
use crate::runner::variables::is_reserved;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const BLOCK_PREFIX: &str = "block:";

/// Prefix table, checked in order. First match wins.
const PREFIXES: [(&str, CommandKind); 8] = [
    (BLOCK_PREFIX, CommandKind::Block),
    ("sleep:", CommandKind::Sleep),
    ("print:", CommandKind::Print),
    ("frida:", CommandKind::Frida),
    ("write:", CommandKind::Write),
    ("append:", CommandKind::Append),
    ("read:", CommandKind::Read),
    ("reverse:", CommandKind::Reverse),
];

fn capture_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\?(\S+)\s+(.*\S.*)$").unwrap())
}

/// Classify a raw command by prefix, returning the operand text that follows
/// the prefix. Capture (`?token ...`) and shell commands return the whole
/// string.
pub fn classify(raw: &str) -> (CommandKind, &str) {
    for (prefix, kind) in PREFIXES {
        if let Some(operand) = raw.strip_prefix(prefix) {
            return (kind, operand);
        }
    }
    if raw.starts_with('?') {
        return (CommandKind::Capture, raw);
    }
    (CommandKind::Shell, raw)
}

/// Parse a raw command into an [`Operation`].
///
/// `substitute` is applied to operand text before it is interpreted. Block
/// names and capture token names are taken literally.
pub fn parse_command<F>(raw: &str, substitute: F) -> Result<Operation, CommandError>
where
    F: Fn(&str) -> String,
{
    let (kind, operand) = classify(raw);

    match kind {
        CommandKind::Block => {
            let name = operand.trim();
            if name.is_empty() {
                return Err(CommandError::invalid("block", "missing block name"));
            }
            Ok(Operation::Block {
                name: name.to_string(),
            })
        }

        CommandKind::Sleep => {
            let value = substitute(operand);
            let value = value.trim();
            let seconds = value
                .parse::<u64>()
                .map_err(|_| CommandError::InvalidSleep(value.to_string()))?;
            Ok(Operation::Sleep { seconds })
        }

        CommandKind::Print => Ok(Operation::Print {
            text: substitute(operand).trim().to_string(),
        }),

        CommandKind::Frida => {
            let value = substitute(operand);
            let parts: Vec<&str> = value.trim().split(';').map(str::trim).collect();
            match parts.as_slice() {
                [script, package] if !script.is_empty() && !package.is_empty() => {
                    Ok(Operation::Frida {
                        script_path: PathBuf::from(script),
                        package_id: package.to_string(),
                    })
                }
                _ => Err(CommandError::invalid(
                    "frida",
                    "expected '<scriptPath>;<packageId>'",
                )),
            }
        }

        CommandKind::Write | CommandKind::Append => {
            let prefix = kind.name();
            let value = substitute(operand);
            let (path, data) = value
                .split_once(';')
                .ok_or_else(|| CommandError::invalid(prefix, "expected '<path>;<data>'"))?;
            let path = path.trim();
            if path.is_empty() {
                return Err(CommandError::invalid(prefix, "missing path"));
            }
            let path = PathBuf::from(path);
            let data = data.to_string();
            Ok(if kind == CommandKind::Write {
                Operation::Write { path, data }
            } else {
                Operation::Append { path, data }
            })
        }

        CommandKind::Read => {
            let (path, token) = operand
                .rsplit_once(';')
                .ok_or_else(|| CommandError::invalid("read", "expected '<path>;<token>'"))?;
            let token = token.trim();
            if token.is_empty() {
                return Err(CommandError::invalid("read", "missing token"));
            }
            if is_reserved(token) {
                return Err(CommandError::ReservedToken(token.to_string()));
            }
            let path = substitute(path);
            let path = path.trim();
            if path.is_empty() {
                return Err(CommandError::invalid("read", "missing path"));
            }
            Ok(Operation::Read {
                path: PathBuf::from(path),
                token: token.to_string(),
            })
        }

        CommandKind::Reverse => {
            let value = substitute(operand);
            let value = value.trim();
            let (apk, params) = match value.split_once(';') {
                Some((apk, params)) => (apk.trim(), parse_reverse_params(params)?),
                None => (value, Vec::new()),
            };
            if apk.is_empty() {
                return Err(CommandError::invalid("reverse", "missing APK path"));
            }
            let params = if params.is_empty() {
                vec![ReverseParam::Zip]
            } else {
                params
            };
            Ok(Operation::Reverse {
                apk_path: PathBuf::from(apk),
                params,
            })
        }

        CommandKind::Capture => {
            let caps = capture_regex().captures(operand).ok_or_else(|| {
                CommandError::invalid("capture", "expected '?<token> <command>'")
            })?;
            let token = &caps[1];
            if is_reserved(token) {
                return Err(CommandError::ReservedToken(token.to_string()));
            }
            Ok(Operation::Capture {
                token: token.to_string(),
                command: substitute(&caps[2]).trim().to_string(),
            })
        }

        CommandKind::Shell => {
            let command = substitute(operand).trim().to_string();
            if command.is_empty() {
                return Err(CommandError::invalid("shell", "empty command"));
            }
            Ok(Operation::Shell { command })
        }
    }
}

fn parse_reverse_params(list: &str) -> Result<Vec<ReverseParam>, CommandError> {
    let mut params = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let param = item
            .parse::<ReverseParam>()
            .map_err(|e| CommandError::invalid("reverse", e))?;
        if !params.contains(&param) {
            params.push(param);
        }
    }
    Ok(params)
}
