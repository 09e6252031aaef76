#![allow(unreachable_pub)]

mod error;
mod outcome;
mod prefix;

pub use error::ErrorKind;
pub use outcome::{Outcome, OutcomeKind, QueryResult};
pub use prefix::{Charset, Prefix};

/// The harvest `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
