//! Turning one capped result window into the prefixes that can still hide
//! undiscovered names.
//!
//! An endpoint returning a full window for prefix `p` has shown us every
//! name up to some boundary name `L`. Names sorting before `L` are all
//! known, so only the branch containing `L` and the branches sorting after
//! it need further queries: `p + L[len(p)]` and `p + c` for every charset
//! character `c` greater than that boundary character.

use serde::{Deserialize, Serialize};

use crate::{Charset, Prefix, QueryResult};

/// What to do with a truncated window that reveals no boundary character.
///
/// This happens when the greatest matching name equals the prefix itself,
/// or when the endpoint returned names that do not start with the prefix.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum BoundaryPolicy {
    /// Enqueue the prefix extended by every charset character
    #[default]
    ExpandAll,
    /// Treat the prefix as a leaf and accept possibly missed names
    Leaf,
}

/// The greatest returned name starting with `prefix`, if any
#[must_use]
pub fn boundary_name<'a>(prefix: &Prefix, result: &'a QueryResult) -> Option<&'a str> {
    result
        .names()
        .iter()
        .map(String::as_str)
        .filter(|name| prefix.is_prefix_of(name))
        .max()
}

/// The character following `prefix` in the boundary name.
///
/// `None` if no returned name extends the prefix.
#[must_use]
pub fn boundary_char(prefix: &Prefix, result: &QueryResult) -> Option<char> {
    boundary_name(prefix, result).and_then(|name| prefix.next_char_of(name))
}

/// The child prefixes to explore after querying `prefix`.
///
/// Returns nothing for windows below the cap. Children come in configured
/// charset order, with the boundary branch first. The boundary character
/// itself is always used, even if it is not part of the charset.
#[must_use]
pub fn expand(
    prefix: &Prefix,
    result: &QueryResult,
    charset: &Charset,
    policy: BoundaryPolicy,
) -> Vec<Prefix> {
    if !result.is_truncated() {
        return Vec::new();
    }

    match boundary_char(prefix, result) {
        Some(next) => std::iter::once(prefix.child(next))
            .chain(charset.after(next).map(|c| prefix.child(c)))
            .collect(),
        None => match policy {
            BoundaryPolicy::ExpandAll => charset.chars().iter().map(|&c| prefix.child(c)).collect(),
            BoundaryPolicy::Leaf => Vec::new(),
        },
    }
}
