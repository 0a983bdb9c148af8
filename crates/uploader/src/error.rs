//! Upload error types.
//!
//! The `Display` text of the first three variants is what ends up in a
//! file's `error` field.

use content_sources_client::ApiError;
use content_sources_transfer::TransferError;

/// Errors produced by the upload pipeline.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Failed checksum validation: {0}")]
    Checksum(TransferError),

    #[error("Failed to create upload file: {0}")]
    SessionNegotiation(ApiError),

    #[error("Failed to upload chunk: {start} to {end}")]
    ChunkUpload { start: u64, end: u64 },

    #[error("no upload named {0}")]
    NotFound(String),

    #[error("uploads are not ready to be attached")]
    NotReady,

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}
