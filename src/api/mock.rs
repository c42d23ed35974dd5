use super::{Cursor, Proxy};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::info;

/// A scripted proxy used in tests. Each `fetch_page` call pops the next
/// scripted response; once the script is exhausted it answers with an absent
/// page. Every cursor it was called with is recorded.
pub struct MockProxy {
    name: String,
    script: Mutex<VecDeque<Result<Option<Value>>>>,
    calls: Mutex<Vec<Option<String>>>,
}

impl MockProxy {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a page (None = absent page).
    pub fn with_page(mut self, page: Option<Value>) -> Self {
        self.script.get_mut().push_back(Ok(page));
        self
    }

    pub fn with_error(mut self, error: IngestError) -> Self {
        self.script.get_mut().push_back(Err(error));
        self
    }

    /// Cursors of every call so far, in order; the first call has None.
    pub async fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().await.clone()
    }

    /// Number of calls made with a cursor, i.e. follow-up page requests.
    pub async fn follow_up_calls(&self) -> usize {
        self.calls.lock().await.iter().filter(|c| c.is_some()).count()
    }
}

#[async_trait]
impl Proxy for MockProxy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(&self, cursor: Option<&Cursor>) -> Result<Option<Value>> {
        info!("MockProxy {}: fetch_page cursor={:?}", self.name, cursor.map(Cursor::as_str));
        self.calls
            .lock()
            .await
            .push(cursor.map(|c| c.as_str().to_string()));
        self.script.lock().await.pop_front().unwrap_or(Ok(None))
    }
}
