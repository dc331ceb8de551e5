//! Restricted execution surface for bot code.
//!
//! There is no embedded interpreter here: inline source is screened
//! statically (import allowlist, denied constructs, dunder scan) and its bot
//! class is then resolved against the registry of compiled-in classes. The
//! screened source text is what gets hashed and served back to participants,
//! so the transparency protocol is unaffected by how execution is realized.
//!
//! The second half of the sandbox contract is timing: every hook runs on a
//! blocking thread under a wall-clock deadline. On overrun the hook is
//! abandoned and its Context is marked expired, so late posts and state
//! writes are refused — work completed before the deadline stays durable.
//!
//! This aims at containing honest mistakes and obvious overreach, not at
//! withstanding a determined adversary.

use tracing::warn;

use crate::error::{BotError, Result};

/// Top-level modules inline bot source may import. Exact strings.
pub const IMPORT_ALLOWLIST: &[&str] = &[
    // core
    "json", "math", "random", "datetime", "time", "re", "base64", "hashlib", "hmac", "secrets",
    "collections", "itertools", "functools", "io", "traceback", "typing", "copy", "weakref",
    "warnings", "email",
    // network
    "socket", "ssl", "http", "urllib", "urllib3", "requests", "certifi", "charset_normalizer",
    "idna",
];

/// Dunder identifiers tolerated in screened source.
const DUNDER_ALLOWLIST: &[&str] = &["__init__", "__name__"];

/// Callables whose mere presence fails screening.
const DENIED_CALLS: &[&str] = &["eval", "exec", "compile", "open", "__import__"];

/// Outcome of screening one inline source blob.
#[derive(Debug, Clone)]
pub struct ScreenedSource {
    /// The bot class screening selected: the class matching the declared bot
    /// name, else the first capitalized, non-underscore-prefixed class.
    pub class_name: String,
}

/// Statically screen inline bot source.
pub fn screen_source(source: &str, declared_name: &str) -> Result<ScreenedSource> {
    let mut classes: Vec<String> = Vec::new();

    for line in source.lines() {
        let trimmed = line.trim_start();

        for module in imported_modules(trimmed) {
            if !IMPORT_ALLOWLIST.contains(&module.as_str()) {
                return Err(BotError::ImportDenied { module });
            }
        }

        for name in DENIED_CALLS {
            if contains_call(trimmed, name) {
                return Err(BotError::CompileError(format!(
                    "use of '{name}' is not allowed"
                )));
            }
        }

        if let Some(dunder) = first_denied_dunder(trimmed) {
            return Err(BotError::CompileError(format!(
                "access to '{dunder}' is not allowed"
            )));
        }

        if let Some(class_name) = class_definition(line) {
            classes.push(class_name);
        }
    }

    let class_name = classes
        .iter()
        .find(|c| c.as_str() == declared_name)
        .or_else(|| {
            classes.iter().find(|c| {
                c.chars().next().is_some_and(|ch| ch.is_ascii_uppercase())
            })
        })
        .cloned()
        .ok_or_else(|| {
            BotError::NoBotClass(format!("no bot class found in inline code for {declared_name}"))
        })?;

    Ok(ScreenedSource { class_name })
}

/// Top-level modules named by an `import a, b.c` or `from x.y import z` line.
fn imported_modules(line: &str) -> Vec<String> {
    if let Some(rest) = line.strip_prefix("import ") {
        return rest
            .split(',')
            .filter_map(|part| {
                let name = part.trim().split_whitespace().next()?; // drop "as alias"
                top_module(name)
            })
            .collect();
    }
    if let Some(rest) = line.strip_prefix("from ") {
        if let Some(name) = rest.trim().split_whitespace().next() {
            return top_module(name).into_iter().collect();
        }
    }
    Vec::new()
}

fn top_module(dotted: &str) -> Option<String> {
    let top = dotted.split('.').next()?.trim();
    if top.is_empty() {
        None
    } else {
        Some(top.to_string())
    }
}

/// True when `name` appears as a call (word boundary before, `(` after).
fn contains_call(line: &str, name: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = line[start..].find(name) {
        let at = start + pos;
        let before_ok = at == 0
            || !line[..at]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let after = line[at + name.len()..].trim_start();
        if before_ok && after.starts_with('(') {
            return true;
        }
        start = at + name.len();
    }
    false
}

/// First `__dunder__` token on the line that is not allowlisted.
fn first_denied_dunder(line: &str) -> Option<String> {
    for token in line.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')) {
        if token.len() > 4
            && token.starts_with("__")
            && token.ends_with("__")
            && !DUNDER_ALLOWLIST.contains(&token)
        {
            return Some(token.to_string());
        }
    }
    None
}

/// Class name declared by a top-level `class Foo(...)` / `class Foo:` line.
fn class_definition(line: &str) -> Option<String> {
    // top level only: no leading indentation
    let rest = line.strip_prefix("class ")?;
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Run a hook body on a blocking thread under a wall-clock deadline.
///
/// On overrun the thread is abandoned (its Context refuses further effects)
/// and `HOOK_TIMEOUT` is returned for the caller to log. A panicking hook is
/// contained the same way and reported as an internal error.
pub async fn run_hook<F>(hook: &str, timeout_ms: u64, body: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let deadline = std::time::Duration::from_millis(timeout_ms);
    match tokio::time::timeout(deadline, tokio::task::spawn_blocking(body)).await {
        Err(_) => Err(BotError::HookTimeout {
            hook: hook.to_string(),
            ms: timeout_ms,
        }),
        Ok(Err(join_err)) => {
            warn!(hook, error = %join_err, "bot hook panicked");
            Err(BotError::Internal(format!("hook '{hook}' panicked")))
        }
        Ok(Ok(result)) => result,
    }
}
