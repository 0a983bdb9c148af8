//! Wire protocol types for the content-sources upload API.
//!
//! Shared by the HTTP client and the upload pipeline so both sides agree on
//! field names and on the chunking constants the server expects.

pub mod constants;
pub mod messages;
pub mod types;

pub use constants::{BATCH_SIZE, MAX_CHUNK_SIZE, MAX_RETRY_COUNT, UploadLimits};
pub use messages::{
    AddUploadsRequest, ArtifactRef, ChunkUpload, CreateUploadRequest, CreateUploadResponse,
    UploadRef,
};
pub use types::{ResolvedUpload, chunk_range};
