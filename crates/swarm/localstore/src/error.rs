//! Local store error types.

use vertex_storage::DatabaseError;

use crate::ChunkAddress;

/// Errors from local store operations.
#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    /// Chunk not found, either never stored or already garbage collected.
    #[error("chunk not found: {0}")]
    ChunkNotFound(ChunkAddress),

    /// Sync confirmation for a chunk that has no retrieval entry.
    #[error("chunk not uploaded: {0}")]
    NotUploaded(ChunkAddress),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No tokio runtime to spawn the garbage collector on.
    #[error("no runtime for the garbage collector: {0}")]
    NoRuntime(String),

    /// Database error.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl LocalStoreError {
    /// Whether this is a [`LocalStoreError::ChunkNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ChunkNotFound(_))
    }
}
