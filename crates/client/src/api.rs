//! Transport-agnostic view of the upload endpoints.

use std::future::Future;
use std::pin::Pin;

use content_sources_protocol::{
    AddUploadsRequest, ChunkUpload, CreateUploadRequest, CreateUploadResponse,
};

use crate::ApiError;

/// Boxed future returned by [`UploadApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// The server operations a chunked upload needs.
///
/// Kept as a trait so the pipeline is testable without a server.
pub trait UploadApi: Send + Sync {
    /// Opens an upload session for a file identified by checksum and size.
    fn create_upload(&self, req: CreateUploadRequest) -> ApiFuture<'_, CreateUploadResponse>;

    /// Stores one chunk in an open session. Only success matters.
    fn upload_chunk(&self, chunk: ChunkUpload) -> ApiFuture<'_, ()>;

    /// Attaches finished uploads and existing artifacts to a repository.
    fn add_uploads(&self, repository_uuid: &str, req: AddUploadsRequest) -> ApiFuture<'_, ()>;
}
