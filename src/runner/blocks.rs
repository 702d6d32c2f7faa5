use crate::parser::command::BLOCK_PREFIX;

/// Name given to a script whose `commands` is a flat list
pub const MAIN_BLOCK: &str = "main";

/// Named command blocks in script order
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    blocks: Vec<(String, Vec<String>)>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a flat command list as the single `main` block
    pub fn single(commands: Vec<String>) -> Self {
        let mut registry = Self::new();
        registry.insert(MAIN_BLOCK, commands);
        registry
    }

    /// Register a block. Re-registering a name replaces its commands in place.
    pub fn insert(&mut self, name: &str, commands: Vec<String>) {
        if let Some(slot) = self.blocks.iter_mut().find(|(n, _)| n == name) {
            slot.1 = commands;
        } else {
            self.blocks.push((name.to_string(), commands));
        }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.blocks
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cmds)| cmds.as_slice())
    }

    /// Block names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// `(block, referenced name)` for every `block:` command naming a block
    /// that does not exist
    pub fn dangling_references(&self) -> Vec<(String, String)> {
        let mut dangling = Vec::new();
        for (name, commands) in &self.blocks {
            for cmd in commands {
                if let Some(target) = cmd.strip_prefix(BLOCK_PREFIX) {
                    let target = target.trim();
                    if self.get(target).is_none() {
                        dangling.push((name.clone(), target.to_string()));
                    }
                }
            }
        }
        dangling
    }
}
