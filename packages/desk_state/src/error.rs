use crate::blob::BlobError;

/// Result type for desktop operations
pub type Result<T> = std::result::Result<T, DeskError>;

/// Errors surfaced to the caller of a desktop operation.
///
/// Subscriber delivery failures never appear here; a failed delivery only
/// unregisters the connection.
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    /// Input could not be decoded or names something the store cannot hold
    #[error("invalid input: {message}")]
    Validation { message: String },

    /// No blob stored under the requested name
    #[error("file not found: {name}")]
    FileNotFound { name: String },

    /// Writing to the blob store failed; in-memory state is unchanged
    #[error("failed to persist file {name}: {source}")]
    Persistence {
        name: String,
        #[source]
        source: BlobError,
    },

    /// Reading from the blob store failed for a reason other than absence
    #[error("failed to read file {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: BlobError,
    },
}

impl DeskError {
    pub fn validation(message: impl Into<String>) -> Self {
        DeskError::Validation {
            message: message.into(),
        }
    }

    /// Map a blob read failure, keeping absence distinct from I/O trouble.
    pub(crate) fn from_read(name: &str, err: BlobError) -> Self {
        match err {
            BlobError::NotFound { .. } => DeskError::FileNotFound {
                name: name.to_string(),
            },
            other => DeskError::Read {
                name: name.to_string(),
                source: other,
            },
        }
    }
}
