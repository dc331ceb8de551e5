//! Opaque id minting for channels, invites, and rejoin tokens.
//!
//! Ids are `<prefix>_<32 hex chars>` drawn from a v4 UUID — unguessable and
//! free of separator characters, so they survive being embedded in slot
//! specs, file names, and log lines.

use uuid::Uuid;

pub const CHANNEL_PREFIX: &str = "chn";
pub const INVITE_PREFIX: &str = "inv";
pub const REJOIN_PREFIX: &str = "tok";

/// Mint a fresh opaque id with the given prefix.
pub fn mint(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// 32 lowercase hex chars with no prefix — used for nonces.
pub fn mint_raw() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A uniformly-ish distributed integer in `[lo, hi]` derived from a v4 UUID.
///
/// Good enough for game targets; avoids pulling in a rand dependency for the
/// one place that needs a random number.
pub fn random_in_range(lo: i64, hi: i64) -> i64 {
    if hi <= lo {
        return lo;
    }
    let span = (hi - lo + 1) as u128;
    lo + (Uuid::new_v4().as_u128() % span) as i64
}
