//! In-memory cluster used by unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ClusterError, RestError};

use super::client::{ApplyOptions, ClusterClient, RestRequest};

/// Records every call and replays scripted answers.
#[derive(Debug, Default)]
pub struct FakeCluster {
    requests: Mutex<Vec<RestRequest>>,
    responses: Mutex<VecDeque<Result<Vec<u8>, RestError>>>,
    applied: Mutex<Vec<(String, ApplyOptions)>>,
    apply_failures: Mutex<VecDeque<ClusterError>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the answer for the next REST request.
    pub fn respond(&self, response: Result<Vec<u8>, RestError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Makes the next manifest application fail.
    pub fn fail_apply(&self, error: ClusterError) {
        self.apply_failures.lock().unwrap().push_back(error);
    }

    pub fn requests(&self) -> Vec<RestRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn applied(&self) -> Vec<(String, ApplyOptions)> {
        self.applied.lock().unwrap().clone()
    }

    /// Highest number of REST requests seen in flight at once.
    pub fn peak_requests(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn apply_manifest(
        &self,
        manifest: &[u8],
        options: &ApplyOptions,
    ) -> Result<(), ClusterError> {
        if let Some(error) = self.apply_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.applied.lock().unwrap().push((
            String::from_utf8_lossy(manifest).into_owned(),
            options.clone(),
        ));
        Ok(())
    }

    async fn request(&self, request: RestRequest) -> Result<Vec<u8>, RestError> {
        self.requests.lock().unwrap().push(request);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(br#"{"kind": "Status", "status": "Success"}"#.to_vec()))
    }
}
