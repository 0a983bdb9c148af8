//! reqwest-based implementation of [`UploadApi`].

use reqwest::header::{AUTHORIZATION, CONTENT_RANGE, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use content_sources_protocol::{
    AddUploadsRequest, ChunkUpload, CreateUploadRequest, CreateUploadResponse,
};

use crate::api::{ApiFuture, UploadApi};

/// Errors from the upload API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid API token")]
    InvalidToken,

    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}

/// Upload API client rooted at a base URL such as
/// `https://console.example.com/api/content-sources/v1`.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a client, optionally sending `Authorization: Bearer <token>`.
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| ApiError::InvalidToken)?,
            );
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POSTs a JSON body and returns the raw response body.
    async fn post_json<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self.http.post(&url).json(body).send().await?;
        check_status(resp).await
    }

    async fn post_json_for<T: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<R, ApiError> {
        let body = self.post_json(endpoint, body).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Opens an upload session.
    pub async fn create_upload(
        &self,
        req: &CreateUploadRequest,
    ) -> Result<CreateUploadResponse, ApiError> {
        let resp: CreateUploadResponse = self.post_json_for("/uploads/", req).await?;
        debug!(
            upload = %resp.upload_uuid,
            artifact = resp.artifact_href.is_some(),
            known_chunks = resp.completed_checksums.as_ref().map_or(0, Vec::len),
            "upload session opened"
        );
        Ok(resp)
    }

    /// Sends one chunk as a multipart form with a `Content-Range` header.
    pub async fn upload_chunk(&self, chunk: ChunkUpload) -> Result<(), ApiError> {
        let url = format!("{}/uploads/{}/chunks/", self.base_url, chunk.upload_uuid);
        let range = HeaderValue::from_str(&chunk.chunk_range)
            .map_err(|_| ApiError::InvalidHeader(chunk.chunk_range.clone()))?;

        let form = Form::new()
            .text("sha256", chunk.sha256)
            .text("created", chunk.created)
            .part(
                "file",
                Part::bytes(chunk.data)
                    .file_name("chunk")
                    .mime_str("application/octet-stream")?,
            );

        let resp = self
            .http
            .post(&url)
            .header(CONTENT_RANGE, range)
            .multipart(form)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    /// Attaches uploads to a repository.
    pub async fn add_uploads(
        &self,
        repository_uuid: &str,
        req: &AddUploadsRequest,
    ) -> Result<(), ApiError> {
        self.post_json(&format!("/repositories/{repository_uuid}/add_uploads/"), req)
            .await?;
        Ok(())
    }
}

/// Maps non-2xx responses to [`ApiError::Api`], otherwise returns the body.
async fn check_status(resp: reqwest::Response) -> Result<Vec<u8>, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.bytes().await?.to_vec())
}

impl UploadApi for Client {
    fn create_upload(&self, req: CreateUploadRequest) -> ApiFuture<'_, CreateUploadResponse> {
        Box::pin(async move { Client::create_upload(self, &req).await })
    }

    fn upload_chunk(&self, chunk: ChunkUpload) -> ApiFuture<'_, ()> {
        Box::pin(Client::upload_chunk(self, chunk))
    }

    fn add_uploads(&self, repository_uuid: &str, req: AddUploadsRequest) -> ApiFuture<'_, ()> {
        let repository_uuid = repository_uuid.to_string();
        Box::pin(async move { Client::add_uploads(self, &repository_uuid, &req).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Reads one full HTTP/1.1 request (headers plus body) from `stream`.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut tmp = [0u8; 8192];
        loop {
            let n = stream.read(&mut tmp).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&tmp[..n]);

            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let headers = text[..header_end].to_ascii_lowercase();
            let body_len = buf.len() - (header_end + 4);

            if let Some(len) = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
            {
                if body_len >= len {
                    break;
                }
            } else if headers.contains("transfer-encoding: chunked") {
                if text.ends_with("0\r\n\r\n") {
                    break;
                }
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Serves a single request, replying with `status` and `body`.
    ///
    /// The join handle yields the raw request for assertions.
    async fn mock_server(status: u16, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/api/content-sources/v1");
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;

            let resp = format!(
                "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        (url, handle)
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = Client::new("http://localhost/api/", None).unwrap();
        assert_eq!(client.base_url(), "http://localhost/api");
    }

    #[test]
    fn invalid_token_rejected() {
        let result = Client::new("http://localhost", Some("bad\ntoken"));
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }

    #[tokio::test]
    async fn create_upload_parses_response() {
        let json = r#"{"upload_uuid":"u-1","created":"2024-05-01T10:00:00Z","completed_checksums":["c1"]}"#;
        let (url, handle) = mock_server(201, json).await;

        let client = Client::new(&url, Some("secret")).unwrap();
        let resp = client
            .create_upload(&CreateUploadRequest {
                size: 42,
                checksum: "abc".into(),
                chunk_size: 16,
            })
            .await
            .unwrap();

        assert_eq!(resp.upload_uuid, "u-1");
        assert_eq!(resp.created, "2024-05-01T10:00:00Z");
        assert_eq!(resp.completed_checksums, Some(vec!["c1".to_string()]));

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /api/content-sources/v1/uploads/ HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains(r#""checksum":"abc""#));
        assert!(request.contains(r#""size":42"#));
    }

    #[tokio::test]
    async fn create_upload_server_error() {
        let (url, _handle) = mock_server(500, r#"{"errors":[{"detail":"boom"}]}"#).await;
        let client = Client::new(&url, None).unwrap();

        let result = client
            .create_upload(&CreateUploadRequest {
                size: 1,
                checksum: "abc".into(),
                chunk_size: 16,
            })
            .await;

        match result {
            Err(ApiError::Api { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_upload_malformed_json() {
        let (url, _handle) = mock_server(200, "not json").await;
        let client = Client::new(&url, None).unwrap();

        let result = client
            .create_upload(&CreateUploadRequest {
                size: 1,
                checksum: "abc".into(),
                chunk_size: 16,
            })
            .await;
        assert!(matches!(result, Err(ApiError::Json(_))));
    }

    #[tokio::test]
    async fn upload_chunk_sends_range_and_form() {
        let (url, handle) = mock_server(200, "{}").await;
        let client = Client::new(&url, None).unwrap();

        client
            .upload_chunk(ChunkUpload {
                upload_uuid: "u-9".into(),
                chunk_range: "bytes 0-4/10".into(),
                created: "2024-05-01T10:00:00Z".into(),
                sha256: "deadbeef".into(),
                data: b"HELLO".to_vec(),
            })
            .await
            .unwrap();

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /api/content-sources/v1/uploads/u-9/chunks/ HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("content-range: bytes 0-4/10"));
        assert!(request.contains("name=\"sha256\""));
        assert!(request.contains("deadbeef"));
        assert!(request.contains("name=\"file\""));
        assert!(request.contains("HELLO"));
    }

    #[tokio::test]
    async fn upload_chunk_failure_status() {
        let (url, _handle) = mock_server(502, "bad gateway").await;
        let client = Client::new(&url, None).unwrap();

        let result = client
            .upload_chunk(ChunkUpload {
                upload_uuid: "u".into(),
                chunk_range: "bytes 0-0/1".into(),
                created: String::new(),
                sha256: String::new(),
                data: vec![0],
            })
            .await;
        assert!(matches!(result, Err(ApiError::Api { status: 502, .. })));
    }

    #[tokio::test]
    async fn add_uploads_through_trait() {
        let (url, handle) = mock_server(200, "{}").await;
        let client = Client::new(&url, None).unwrap();
        let api: &dyn UploadApi = &client;

        let req = AddUploadsRequest {
            uploads: vec![content_sources_protocol::UploadRef {
                uuid: "u1".into(),
                sha256: "s1".into(),
            }],
            artifacts: Vec::new(),
        };
        api.add_uploads("repo-1", req).await.unwrap();

        let request = handle.await.unwrap();
        assert!(request.starts_with(
            "POST /api/content-sources/v1/repositories/repo-1/add_uploads/ HTTP/1.1"
        ));
        assert!(request.contains(r#""uuid":"u1""#));
    }
}
