//! Resumable chunked upload pipeline.
//!
//! Library crate with no transport of its own: callers hand it an
//! [`UploadApi`](content_sources_client::UploadApi) implementation.
//!
//! # Pipeline
//!
//! 1. **Checksum**: whole-file and per-chunk SHA-256, computed off the runtime
//! 2. **Negotiate**: open a server session, learn which chunks it already has
//! 3. **Schedule**: small files in concurrent batches, large files one by one
//! 4. **Upload**: each file's chunks in bounded waves with per-chunk retry
//! 5. **Resolve**: finished files become the payload for the attach step

mod batch;
pub mod error;
pub mod events;
pub mod orchestrator;
mod session;
mod transmit;

#[cfg(test)]
mod mock;

pub use error::UploadError;
pub use events::{FileProgress, UploadEvent, UploadSummary};
pub use orchestrator::UploadOrchestrator;
