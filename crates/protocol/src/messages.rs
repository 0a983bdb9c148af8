use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Opens (or looks up) an upload session for one file.
///
/// The server keys sessions by `checksum` and `size`, which is what makes
/// re-uploading a known file resumable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateUploadRequest {
    pub size: u64,
    pub checksum: String,
    pub chunk_size: u64,
}

/// One chunk of file data.
///
/// Sent as a multipart form: `file` carries `data`, `chunk_range` goes into
/// the `Content-Range` header.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkUpload {
    pub upload_uuid: String,
    pub chunk_range: String,
    pub created: String,
    pub sha256: String,
    pub data: Vec<u8>,
}

/// Attaches finished uploads to a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddUploadsRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uploads: Vec<UploadRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,
}

/// A completed upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRef {
    pub uuid: String,
    pub sha256: String,
}

/// An artifact the server already had before the upload started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub href: String,
    pub sha256: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Server answer to [`CreateUploadRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateUploadResponse {
    pub upload_uuid: String,
    #[serde(default)]
    pub created: String,
    /// Per-chunk digests the server already stores for this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_checksums: Option<Vec<String>>,
    /// Set when the whole file is already stored as an artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_href: Option<String>,
}
