use serde::{Deserialize, Serialize};

use crate::messages::{AddUploadsRequest, ArtifactRef, UploadRef};

/// Formats the `Content-Range` descriptor for an inclusive byte range.
pub fn chunk_range(start: u64, end: u64, total: u64) -> String {
    format!("bytes {start}-{end}/{total}")
}

/// A file that is fully stored server side and ready to be attached.
///
/// Exactly one of `uuid` (a finished upload session) or `href` (an artifact
/// that already existed) is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUpload {
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl AddUploadsRequest {
    /// Splits resolved uploads into session uploads and existing artifacts.
    pub fn from_resolved(resolved: &[ResolvedUpload]) -> Self {
        let mut req = AddUploadsRequest::default();
        for r in resolved {
            if let Some(href) = &r.href {
                req.artifacts.push(ArtifactRef {
                    href: href.clone(),
                    sha256: r.sha256.clone(),
                });
            } else if let Some(uuid) = &r.uuid {
                req.uploads.push(UploadRef {
                    uuid: uuid.clone(),
                    sha256: r.sha256.clone(),
                });
            }
        }
        req
    }
}
