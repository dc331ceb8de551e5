//! Catalogue of bot classes resolvable by name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::builtin;
use crate::traits::BotClass;

/// Name → class catalogue. Shared process-wide; `register` is public so hosts
/// can extend the builtin set with their own compiled-in bots.
pub struct BotRegistry {
    classes: RwLock<HashMap<String, Arc<dyn BotClass>>>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// A registry pre-loaded with every builtin bot.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for class in builtin::all() {
            registry.register(class);
        }
        registry
    }

    /// Register a class under its own name. Re-registering replaces.
    pub fn register(&self, class: Arc<dyn BotClass>) {
        let name = class.name().to_string();
        debug!(bot_class = %name, "bot class registered");
        self.classes
            .write()
            .expect("bot registry poisoned")
            .insert(name, class);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn BotClass>> {
        self.classes
            .read()
            .expect("bot registry poisoned")
            .get(name)
            .cloned()
    }

    /// Registered class names, sorted for deterministic output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .classes
            .read()
            .expect("bot registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for BotRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
