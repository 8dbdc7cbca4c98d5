//! Deterministic alias derivation.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static SAFE_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("alias pattern is valid")
});

/// Derives an alias from its parts.
///
/// The result is `<prefix>_` followed by the first 32 hex digits of the SHA-256
/// of the non-empty parts joined with `_`. Identical inputs always give the same
/// alias, and the output contains only `[a-z0-9_]` so it never needs quoting.
pub fn alias<I, S>(prefix: &str, parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = parts
        .into_iter()
        .filter(|p| !p.as_ref().is_empty())
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("_");

    let digest = format!("{:x}", Sha256::digest(joined.as_bytes()));
    format!("{}_{}", prefix, &digest[..32])
}

/// Returns true if `name` can be used unquoted as a generated alias.
pub fn is_safe_alias(name: &str) -> bool {
    SAFE_ALIAS.is_match(name)
}
