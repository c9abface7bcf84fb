use std::error::Error as StdError;

/// Common error type for `orgshift_core`.
///
/// Only two conditions are fatal to a whole run: failing to reach the
/// destination org at startup, and asking for an object type that is not in
/// the configured import order. Everything else degrades per object type or
/// per record and is surfaced through run counters.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The destination org could not answer a describe call. Callers skip
    /// metadata-driven enrichment for that object type and continue.
    #[error("metadata unavailable for {object}: {reason}")]
    MetadataUnavailable { object: String, reason: String },

    /// No snapshot table exists for the object type.
    #[error("snapshot missing for {0}")]
    SnapshotMissing(String),

    /// The snapshot table exists but cannot be used (e.g. no `Id` column).
    #[error("snapshot malformed for {object}: {reason}")]
    SnapshotMalformed { object: String, reason: String },

    /// A bulk submission failed as a whole; the executor retries serially.
    #[error("batch submission failed: {0}")]
    BatchSubmissionFailed(String),

    #[error("backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("backend error: {0}")]
    BackendMessage(String),
}

impl Error {
    pub fn backend(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn metadata_unavailable(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetadataUnavailable {
            object: object.into(),
            reason: reason.into(),
        }
    }

    pub fn snapshot_malformed(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SnapshotMalformed {
            object: object.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
