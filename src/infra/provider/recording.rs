//! Scriptable in-process provider for tests and dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::provider::{PostingProvider, ProviderError, ProviderResponse, PublishRequest};

/// Provider that records every request and replays scripted answers.
///
/// Without a scripted answer it accepts the post with a generated job id.
#[derive(Default)]
pub struct RecordingProvider {
    requests: Mutex<Vec<PublishRequest>>,
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    next_job: AtomicU64,
}

impl RecordingProvider {
    /// Create a provider that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer for the next call.
    pub fn push_response(&self, response: Result<ProviderResponse, ProviderError>) {
        self.script.lock().push_back(response);
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<PublishRequest> {
        self.requests.lock().clone()
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl PostingProvider for RecordingProvider {
    async fn publish(&self, request: PublishRequest) -> Result<ProviderResponse, ProviderError> {
        let destination = request.destination_id.clone();
        self.requests.lock().push(request);
        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }
        let n = self.next_job.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(ProviderResponse::accepted(
            format!("job-{n}"),
            Some(format!("https://posts.example/{destination}/{n}")),
        ))
    }
}
