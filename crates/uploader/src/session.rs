//! Checksum computation and upload session negotiation for one file.

use std::collections::HashSet;

use tracing::{debug, info};

use content_sources_client::UploadApi;
use content_sources_protocol::{CreateUploadRequest, CreateUploadResponse};
use content_sources_transfer::{
    Chunk, FileUploadState, UploadFile, checksum_source, digest_chunks, plan_chunks,
};

use crate::error::UploadError;

/// Whole-file digest plus the digested chunk plan.
pub(crate) struct FilePlan {
    pub checksum: String,
    pub chunks: Vec<Chunk>,
}

/// Hashes the file and plans its chunks. All failures are checksum failures.
pub(crate) async fn plan_file(file: &UploadFile, max_chunk_size: u64) -> Result<FilePlan, UploadError> {
    let checksum = checksum_source(&file.source)
        .await
        .map_err(UploadError::Checksum)?;

    let mut chunks = plan_chunks(file.size, max_chunk_size).map_err(UploadError::Checksum)?;
    digest_chunks(&file.source, &mut chunks)
        .await
        .map_err(UploadError::Checksum)?;

    debug!(file = %file.name, chunks = chunks.len(), %checksum, "file planned");
    Ok(FilePlan { checksum, chunks })
}

/// Opens the server-side session for a planned file.
pub(crate) async fn negotiate(
    api: &dyn UploadApi,
    size: u64,
    checksum: &str,
    chunk_size: u64,
) -> Result<CreateUploadResponse, UploadError> {
    api.create_upload(CreateUploadRequest {
        size,
        checksum: checksum.to_string(),
        chunk_size,
    })
    .await
    .map_err(UploadError::SessionNegotiation)
}

/// Folds a session response into the file state.
///
/// An existing artifact completes everything; otherwise exactly the chunks
/// whose digest the server reports are marked completed.
pub(crate) fn apply_session(state: &mut FileUploadState, resp: CreateUploadResponse) {
    state.uuid = resp.upload_uuid;
    state.created = resp.created;

    if let Some(href) = resp.artifact_href {
        for chunk in &mut state.chunks {
            chunk.completed = true;
        }
        state.artifact = Some(href);
        state.is_resumed = true;
    } else if let Some(known) = resp.completed_checksums {
        let known: HashSet<String> = known.into_iter().collect();
        let mut matched = 0;
        for chunk in &mut state.chunks {
            if known.contains(&chunk.sha256) {
                chunk.completed = true;
                matched += 1;
            }
        }
        state.is_resumed = matched > 0;
    }

    state.refresh_completed();
    info!(
        file = %state.file.name,
        upload = %state.uuid,
        resumed = state.is_resumed,
        completed = state.completed,
        "upload session ready"
    );
}
