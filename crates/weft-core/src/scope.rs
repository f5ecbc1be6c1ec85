//! Scope pattern matching.
//!
//! One predicate covers every matching site in the fabric: capability
//! checks, audience checks, registry capability filters, and event topic
//! filters. A pattern is an opaque string; everything up to the first `*`
//! is a literal prefix, and a pattern with no `*` only matches exactly.
//! There is no per-segment glob: `inventory:*:low_stock` behaves as the
//! prefix `inventory:`.

/// Returns true if `value` is matched by `pattern`.
///
/// `pattern == value` always matches. Otherwise the pattern must contain
/// `*`; the text before the first `*` is treated as a required prefix of
/// `value`.
pub fn pattern_matches(pattern: &str, value: &str) -> bool {
    if pattern == value {
        return true;
    }
    match pattern.find('*') {
        Some(idx) => value.starts_with(&pattern[..idx]),
        None => false,
    }
}

/// Returns true if any pattern in `patterns` matches `value`.
pub fn any_pattern_matches<'a, I>(patterns: I, value: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    patterns.into_iter().any(|p| pattern_matches(p, value))
}
