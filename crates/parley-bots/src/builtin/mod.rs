//! Compiled-in bot classes.

pub mod echo;
pub mod guess;

use std::sync::Arc;

use crate::traits::BotClass;

/// Every builtin class, for registry seeding.
pub fn all() -> Vec<Arc<dyn BotClass>> {
    vec![
        Arc::new(guess::GuessBotClass),
        Arc::new(echo::EchoBotClass),
    ]
}
