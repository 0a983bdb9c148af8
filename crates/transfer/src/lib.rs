//! Client-side half of a chunked upload: file sources, checksums, chunk
//! plans and the shared per-file state map.

mod checksum;
mod planner;
mod source;
mod store;
mod types;

pub use checksum::{checksum_bytes, checksum_range, checksum_source};
pub use planner::{digest_chunks, plan_chunks};
pub use source::{FileSource, UploadFile};
pub use store::UploadStore;
pub use types::{Chunk, FileStatus, FileUploadState};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is empty")]
    EmptyFile,

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("byte range {start}-{end} is outside a file of {size} bytes")]
    InvalidRange { start: u64, end: u64, size: u64 },

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
