// Per-session request coalescers
// Author: kelexine (https://github.com/kelexine)

use crate::client::{ApiClient, CompletionRequest, CompletionResult};
use crate::coalescer::RequestCoalescer;
use crate::error::ApiError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub type CompletionCoalescer = RequestCoalescer<CompletionRequest, Result<CompletionResult, ApiError>>;

/// Keystrokes from one editor session supersede each other, never those of
/// another session.
pub struct SessionCoalescers {
    client: Arc<dyn ApiClient>,
    wait: Duration,
    sessions: Mutex<HashMap<String, Arc<CompletionCoalescer>>>,
}

impl SessionCoalescers {
    pub fn new(client: Arc<dyn ApiClient>, wait: Duration) -> Self {
        Self {
            client,
            wait,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The coalescer for `session`, created on first use.
    pub fn get(&self, session: &str) -> Arc<CompletionCoalescer> {
        let mut sessions = self.sessions.lock();

        // Forget idle sessions nobody is holding on to.
        sessions.retain(|_, coalescer| Arc::strong_count(coalescer) > 1 || coalescer.is_pending());

        sessions
            .entry(session.to_string())
            .or_insert_with(|| {
                debug!("Creating coalescer for session {}", session);
                let client = self.client.clone();
                Arc::new(RequestCoalescer::new(self.wait, move |request: CompletionRequest| {
                    let client = client.clone();
                    async move { client.fetch_completions(&request).await }
                }))
            })
            .clone()
    }

    /// Cancel the pending request of `session`. Returns whether one was pending.
    pub fn cancel(&self, session: &str) -> bool {
        let coalescer = self.sessions.lock().get(session).cloned();
        match coalescer {
            Some(coalescer) => {
                let was_pending = coalescer.is_pending();
                coalescer.cancel();
                was_pending
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let coalescers: Vec<_> = self.sessions.lock().values().cloned().collect();
        for coalescer in coalescers {
            coalescer.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
