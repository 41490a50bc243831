//! Debug formatting helpers for [`custom_debug_derive`].

use std::fmt;

/// Formats an `Option<T>` by printing the inner value directly (no `Some(...)` wrapper).
///
/// Use with `#[debug(with = crate::fmt::opt)]` on fields that are
/// already gated by `#[debug(skip_if = Option::is_none)]`.
pub fn opt<T: fmt::Debug>(value: &Option<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Some(inner) => fmt::Debug::fmt(inner, f),
        None => f.write_str("None"),
    }
}

/// Prints a fixed placeholder instead of a secret, keeping only whether it is set.
pub fn redacted<T: AsRef<str>>(value: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if value.as_ref().is_empty() {
        f.write_str("\"\"")
    } else {
        f.write_str("\"<redacted>\"")
    }
}
