//! Content hashing for the bot transparency protocol.
//!
//! Hashes are `sha256:` followed by lowercase hex. Inline code is hashed over
//! its raw UTF-8 bytes; code references over the reference string itself;
//! manifests over a canonical JSON form with keys sorted lexicographically at
//! every level, so the digest is stable across implementations and key
//! insertion orders.

use serde_json::Value;
use sha2::{Digest, Sha256};

pub const HASH_PREFIX: &str = "sha256:";

/// `sha256:<hex>` over raw bytes.
pub fn sha256_hex(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    format!("{}{}", HASH_PREFIX, hex::encode(digest))
}

/// Hash bot code content: the inline source text, or the code_ref string.
pub fn code_hash(content: &str) -> String {
    sha256_hex(content.as_bytes())
}

/// Hash a manifest value over its canonical JSON serialization.
pub fn manifest_hash(manifest: &Value) -> String {
    sha256_hex(canonical_json(manifest).as_bytes())
}

/// Compact JSON with object keys sorted lexicographically, recursively.
/// Array order is preserved.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Keys are plain strings; serde_json escapes them for us.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
