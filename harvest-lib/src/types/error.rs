use std::path::PathBuf;
use thiserror::Error;

/// Possible errors when setting up or persisting a harvest.
///
/// Query failures are not errors: they are reported as an
/// [`Outcome`](crate::Outcome) and handled by the retry logic.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A configuration value is out of range or inconsistent with another one
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A custom request header could not be parsed
    #[error("Invalid request header `{0}`: {1}")]
    InvalidHeader(String, String),

    /// The underlying HTTP client could not be created
    #[error("Failed to build HTTP client: {0}")]
    BuildClient(#[source] reqwest::Error),

    /// Reading or writing a checkpoint file failed
    #[error("Checkpoint I/O failed for `{}`: {source}", path.display())]
    CheckpointIo {
        /// The file that could not be accessed
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint file exists but cannot be decoded
    #[error("Checkpoint `{}` cannot be decoded: {source}", path.display())]
    CheckpointFormat {
        /// The offending file
        path: PathBuf,
        /// The underlying decoding error
        #[source]
        source: serde_json::Error,
    },

    /// A checkpoint was written by an incompatible format revision
    #[error("Checkpoint `{}` has format {found}, expected {expected}", path.display())]
    CheckpointVersion {
        /// The offending file
        path: PathBuf,
        /// Format revision found in the file
        found: u32,
        /// Format revision this build understands
        expected: u32,
    },

    /// A worker task panicked or was cancelled unexpectedly
    #[error("Worker task failed: {0}")]
    WorkerPanicked(String),
}

impl ErrorKind {
    /// Returns `true` if this error stems from reading or writing checkpoints
    #[must_use]
    pub const fn is_checkpoint_error(&self) -> bool {
        matches!(
            self,
            Self::CheckpointIo { .. }
                | Self::CheckpointFormat { .. }
                | Self::CheckpointVersion { .. }
        )
    }
}
