use std::collections::HashMap;

/// Current device serial
pub const DEVICE_ID: &str = "!device_id";
/// Current application package
pub const APP_ID: &str = "!app_id";
/// Install path of the current application on the current device
pub const APP_PATH: &str = "!app_path";
/// Device-bridge command prefix for the current device
pub const ADB_CONNECT: &str = "!adb_connect";

pub const RESERVED_TOKENS: [&str; 4] = [DEVICE_ID, APP_ID, APP_PATH, ADB_CONNECT];

pub fn is_reserved(token: &str) -> bool {
    RESERVED_TOKENS.contains(&token)
}

/// Token table used for textual substitution in command text.
///
/// Tokens are applied longest first (ties broken lexically), so a token that
/// is a substring of another never shadows it. A replacement value may itself
/// contain a shorter token, which is expanded by the later pass.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    values: HashMap<String, String>,
}

impl VariableTable {
    pub fn new(seed: HashMap<String, String>) -> Self {
        Self { values: seed }
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.values.get(token).map(|s| s.as_str())
    }

    /// Store or overwrite a value. Empty tokens are ignored since they would
    /// match between every character.
    pub fn capture(&mut self, token: &str, value: impl Into<String>) {
        if token.is_empty() {
            log::warn!("Ignoring capture into empty token");
            return;
        }
        self.values.insert(token.to_string(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every registered token in `text`
    pub fn substitute(&self, text: &str) -> String {
        let mut result = text.to_string();
        for token in self.ordered_tokens() {
            if result.contains(token) {
                result = result.replace(token, &self.values[token]);
            }
        }
        result
    }

    fn ordered_tokens(&self) -> Vec<&str> {
        let mut tokens: Vec<&str> = self.values.keys().map(|k| k.as_str()).collect();
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        tokens
    }

    /// Pairs `(inner, outer)` where `inner` occurs inside `outer`
    pub fn overlapping_tokens(&self) -> Vec<(String, String)> {
        let tokens = self.ordered_tokens();
        let mut pairs = Vec::new();
        for (i, outer) in tokens.iter().enumerate() {
            for inner in &tokens[i + 1..] {
                if outer.contains(inner) {
                    pairs.push((inner.to_string(), outer.to_string()));
                }
            }
        }
        pairs
    }
}
