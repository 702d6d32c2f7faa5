use crate::runner::blocks::BlockRegistry;
use crate::runner::variables::is_reserved;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Token that expands to every connected device or installed package
pub const WILDCARD: &str = "*";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read script '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("script is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("script must be a JSON object")]
    NotAnObject,

    #[error("script is missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("invalid '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("variable name must not be empty")]
    EmptyVariableName,

    #[error("variable '{0}' is reserved by the engine")]
    ReservedVariable(String),
}

/// A loaded automation script
#[derive(Debug, Clone)]
pub struct Script {
    pub devices: Vec<String>,
    pub apps: Vec<String>,
    pub variables: HashMap<String, String>,
    pub blocks: BlockRegistry,
}

impl Script {
    pub fn uses_device_wildcard(&self) -> bool {
        is_wildcard(&self.devices)
    }

    pub fn uses_app_wildcard(&self) -> bool {
        is_wildcard(&self.apps)
    }
}

/// True when a target list is exactly `["*"]`
pub fn is_wildcard(list: &[String]) -> bool {
    matches!(list, [only] if only == WILDCARD)
}

/// Load a script from a JSON file
pub fn parse_script_file(path: &Path) -> Result<Script, ScriptError> {
    let content = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_script(&content)
}

/// Parse script JSON text
pub fn parse_script(content: &str) -> Result<Script, ScriptError> {
    let value: Value = serde_json::from_str(content)?;
    let root = value.as_object().ok_or(ScriptError::NotAnObject)?;

    let devices = string_list(required(root, "devices")?, "devices")?;
    let apps = string_list(required(root, "apps")?, "apps")?;
    let blocks = parse_blocks(required(root, "commands")?)?;

    let variables = match root.get("variables") {
        None | Some(Value::Null) => HashMap::new(),
        Some(value) => parse_variables(value)?,
    };

    Ok(Script {
        devices,
        apps,
        variables,
        blocks,
    })
}

fn required<'a>(root: &'a Map<String, Value>, key: &'static str) -> Result<&'a Value, ScriptError> {
    root.get(key).ok_or(ScriptError::MissingKey(key))
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>, ScriptError> {
    let items = value.as_array().ok_or_else(|| ScriptError::InvalidField {
        field: field.to_string(),
        reason: "expected a list of strings".to_string(),
    })?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ScriptError::InvalidField {
                    field: format!("{}[{}]", field, i),
                    reason: "expected a string".to_string(),
                })
        })
        .collect()
}

fn parse_blocks(value: &Value) -> Result<BlockRegistry, ScriptError> {
    match value {
        Value::Array(_) => Ok(BlockRegistry::single(string_list(value, "commands")?)),
        Value::Object(map) => {
            let mut registry = BlockRegistry::new();
            for (name, commands) in map {
                let field = format!("commands.{}", name);
                registry.insert(name, string_list(commands, &field)?);
            }
            Ok(registry)
        }
        _ => Err(ScriptError::InvalidField {
            field: "commands".to_string(),
            reason: "expected a list of commands or a map of named blocks".to_string(),
        }),
    }
}

fn parse_variables(value: &Value) -> Result<HashMap<String, String>, ScriptError> {
    let map = value.as_object().ok_or_else(|| ScriptError::InvalidField {
        field: "variables".to_string(),
        reason: "expected an object".to_string(),
    })?;

    let mut variables = HashMap::new();
    for (token, value) in map {
        if token.is_empty() {
            return Err(ScriptError::EmptyVariableName);
        }
        if is_reserved(token) {
            return Err(ScriptError::ReservedVariable(token.clone()));
        }
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                return Err(ScriptError::InvalidField {
                    field: format!("variables.{}", token),
                    reason: "expected a string, number or boolean".to_string(),
                })
            }
        };
        variables.insert(token.clone(), text);
    }
    Ok(variables)
}
