use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{ErrorKind, Result};

/// Characters explored by default: ASCII digits followed by lowercase letters
pub const DEFAULT_CHARSET: &str = "0123456789abcdefghijklmnopqrstuvwxyz";

/// A partial string sent to the endpoint as a search query.
///
/// Lengths are counted in characters, never in bytes, so prefixes over
/// non-ASCII alphabets behave the same as ASCII ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prefix(String);

impl Prefix {
    /// The empty prefix every cold start begins with
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// The prefix as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of characters in the prefix
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    /// Returns `true` for the root prefix
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The prefix extended by one character
    #[must_use]
    pub fn child(&self, c: char) -> Self {
        let mut extended = String::with_capacity(self.0.len() + c.len_utf8());
        extended.push_str(&self.0);
        extended.push(c);
        Self(extended)
    }

    /// Returns `true` if `name` starts with this prefix
    #[must_use]
    pub fn is_prefix_of(&self, name: &str) -> bool {
        name.starts_with(self.as_str())
    }

    /// The character of `name` directly following this prefix.
    ///
    /// Returns `None` if `name` does not start with the prefix or is equal to it.
    #[must_use]
    pub fn next_char_of(&self, name: &str) -> Option<char> {
        name.strip_prefix(self.as_str())?.chars().next()
    }
}

impl Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl AsRef<str> for Prefix {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Prefix {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Prefix {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The ordered set of characters used to extend prefixes.
///
/// Order matters: children are generated in this order, while the
/// "greater than the boundary character" test compares Unicode code points.
#[derive(Debug, Clone, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct Charset(Vec<char>);

impl Charset {
    /// Create a charset from the given characters.
    /// Duplicates are dropped, keeping the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns an error if no characters are given.
    pub fn new<I: IntoIterator<Item = char>>(chars: I) -> Result<Self> {
        let mut unique: Vec<char> = Vec::new();
        for c in chars {
            if !unique.contains(&c) {
                unique.push(c);
            }
        }
        if unique.is_empty() {
            return Err(ErrorKind::InvalidConfig(
                "charset must contain at least one character".into(),
            ));
        }
        Ok(Self(unique))
    }

    /// All characters in configured order
    #[must_use]
    pub fn chars(&self) -> &[char] {
        &self.0
    }

    /// Returns `true` if `c` is part of the charset
    #[must_use]
    pub fn contains(&self, c: char) -> bool {
        self.0.contains(&c)
    }

    /// Characters whose code point is strictly greater than `c`, in configured order
    pub fn after(&self, c: char) -> impl Iterator<Item = char> + '_ {
        self.0.iter().copied().filter(move |&other| other > c)
    }

    /// Number of characters in the charset
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; a charset cannot be constructed empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Charset {
    fn default() -> Self {
        Self(DEFAULT_CHARSET.chars().collect())
    }
}

impl FromStr for Charset {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.chars())
    }
}

impl Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.iter().try_for_each(|c| write!(f, "{c}"))
    }
}
