//! Command registry — lowercase name → [`Command`].
//!
//! Populated once at startup. Lookup of an unknown name is `None`, never an
//! error.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::Command;

/// Names handled by the router itself.
pub const RESERVED: &[&str] = &["help", "?"];

pub struct CommandRegistry {
    commands: HashMap<String, Arc<Command>>,
    order: Vec<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registry holding the built-in commands.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::builtin::register_builtins(&mut registry);
        registry
    }

    /// Register a command. Overwrites a previous command with the same name.
    /// Reserved names are refused and `false` is returned.
    pub fn register(&mut self, command: Command) -> bool {
        let name = command.name.to_lowercase();
        if RESERVED.contains(&name.as_str()) {
            warn!(command = %name, "refusing to register a reserved command name");
            return false;
        }

        info!(command = %name, min_args = command.min_args, "registered command");
        if self.commands.insert(name.clone(), Arc::new(command)).is_none() {
            self.order.push(name);
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.get(&name.to_lowercase()).cloned()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
