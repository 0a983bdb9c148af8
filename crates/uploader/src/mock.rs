//! In-memory [`UploadApi`] used by the pipeline tests.
//!
//! Behaves like a deduplicating server: chunks stored under one checksum are
//! reported back as `completed_checksums` on the next session for it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use content_sources_client::{ApiError, ApiFuture, UploadApi};
use content_sources_protocol::{
    AddUploadsRequest, ChunkUpload, CreateUploadRequest, CreateUploadResponse,
};

#[derive(Default)]
struct MockState {
    /// upload uuid -> whole-file checksum.
    sessions: HashMap<String, String>,
    /// whole-file checksum -> stored chunk digests.
    stored: HashMap<String, HashSet<String>>,
    artifacts: HashMap<String, String>,
    session_failures: HashMap<String, u32>,
    /// (uuid, range) -> remaining failures.
    chunk_failures: HashMap<(String, String), u32>,
    created: Vec<CreateUploadRequest>,
    uploaded: Vec<(String, String)>,
    attempts: HashMap<(String, String), u32>,
    /// Ordered `start:<uuid>` / `end:<uuid>` markers.
    log: Vec<String>,
    in_flight_by_upload: HashMap<String, usize>,
    max_in_flight_by_upload: HashMap<String, usize>,
    attached: Vec<(String, AddUploadsRequest)>,
}

pub(crate) struct MockApi {
    state: Mutex<MockState>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub(crate) fn upload_uuid_for(checksum: &str) -> String {
    format!("upload-{}", &checksum[..12.min(checksum.len())])
}

fn injected() -> ApiError {
    ApiError::Api {
        status: 503,
        body: "injected failure".into(),
    }
}

impl MockApi {
    pub(crate) fn new() -> Self {
        Self::with_delay(Duration::from_millis(5))
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_artifact(&self, checksum: &str, href: &str) {
        let mut s = self.state.lock().unwrap();
        s.artifacts.insert(checksum.into(), href.into());
    }

    pub(crate) fn store_chunk_digests(&self, checksum: &str, digests: &[String]) {
        let mut s = self.state.lock().unwrap();
        s.stored
            .entry(checksum.into())
            .or_default()
            .extend(digests.iter().cloned());
    }

    pub(crate) fn fail_session(&self, checksum: &str, times: u32) {
        let mut s = self.state.lock().unwrap();
        s.session_failures.insert(checksum.into(), times);
    }

    pub(crate) fn fail_chunk(&self, upload_uuid: &str, range: &str, times: u32) {
        let mut s = self.state.lock().unwrap();
        s.chunk_failures
            .insert((upload_uuid.into(), range.into()), times);
    }

    pub(crate) fn sessions_created(&self) -> usize {
        self.state.lock().unwrap().created.len()
    }

    pub(crate) fn uploaded_chunks(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().uploaded.clone()
    }

    pub(crate) fn attempts(&self, upload_uuid: &str, range: &str) -> u32 {
        let s = self.state.lock().unwrap();
        s.attempts
            .get(&(upload_uuid.to_string(), range.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight_for(&self, upload_uuid: &str) -> usize {
        let s = self.state.lock().unwrap();
        s.max_in_flight_by_upload
            .get(upload_uuid)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn attached(&self) -> Vec<(String, AddUploadsRequest)> {
        self.state.lock().unwrap().attached.clone()
    }
}

impl UploadApi for MockApi {
    fn create_upload(&self, req: CreateUploadRequest) -> ApiFuture<'_, CreateUploadResponse> {
        Box::pin(async move {
            let mut s = self.state.lock().unwrap();
            s.created.push(req.clone());

            if let Some(left) = s.session_failures.get_mut(&req.checksum) {
                if *left > 0 {
                    *left -= 1;
                    return Err(injected());
                }
            }

            let upload_uuid = upload_uuid_for(&req.checksum);
            s.sessions.insert(upload_uuid.clone(), req.checksum.clone());

            let completed_checksums = s
                .stored
                .get(&req.checksum)
                .filter(|set| !set.is_empty())
                .map(|set| set.iter().cloned().collect());

            Ok(CreateUploadResponse {
                upload_uuid,
                created: "2024-01-01T00:00:00Z".into(),
                completed_checksums,
                artifact_href: s.artifacts.get(&req.checksum).cloned(),
            })
        })
    }

    fn upload_chunk(&self, chunk: ChunkUpload) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let key = (chunk.upload_uuid.clone(), chunk.chunk_range.clone());
            {
                let mut s = self.state.lock().unwrap();
                s.log.push(format!("start:{}", chunk.upload_uuid));
                *s.attempts.entry(key.clone()).or_default() += 1;
                let n = s
                    .in_flight_by_upload
                    .entry(chunk.upload_uuid.clone())
                    .or_default();
                *n += 1;
                let n = *n;
                let max = s
                    .max_in_flight_by_upload
                    .entry(chunk.upload_uuid.clone())
                    .or_default();
                *max = (*max).max(n);
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let mut s = self.state.lock().unwrap();
            s.log.push(format!("end:{}", chunk.upload_uuid));
            if let Some(n) = s.in_flight_by_upload.get_mut(&chunk.upload_uuid) {
                *n -= 1;
            }

            if let Some(left) = s.chunk_failures.get_mut(&key) {
                if *left > 0 {
                    *left -= 1;
                    return Err(injected());
                }
            }

            if let Some(checksum) = s.sessions.get(&chunk.upload_uuid).cloned() {
                s.stored.entry(checksum).or_default().insert(chunk.sha256.clone());
            }
            s.uploaded.push(key);
            Ok(())
        })
    }

    fn add_uploads(&self, repository_uuid: &str, req: AddUploadsRequest) -> ApiFuture<'_, ()> {
        let repository_uuid = repository_uuid.to_string();
        Box::pin(async move {
            self.state.lock().unwrap().attached.push((repository_uuid, req));
            Ok(())
        })
    }
}
