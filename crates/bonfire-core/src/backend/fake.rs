//! In-memory backend for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{Record, SearchBackend, Stream, Terms, UserPermissions};
use crate::error::{Error, Result};
use crate::query::{SearchQuery, TermQuery};
use crate::range::Window;

#[derive(Default)]
pub struct FakeBackend {
    pub streams: Vec<Stream>,
    pub permissions: UserPermissions,
    pub default_stream: Option<String>,
    pub terms: Terms,
    /// Served one per search call; an empty batch once exhausted.
    pub batches: Mutex<VecDeque<Result<Vec<Record>>>>,
    pub windows: Mutex<Vec<Window>>,
    pub searches: Mutex<Vec<SearchQuery>>,
    pub stream_calls: Mutex<usize>,
}

impl FakeBackend {
    pub fn with_streams(streams: &[(&str, &str)]) -> Self {
        Self {
            streams: streams
                .iter()
                .map(|(id, title)| Stream {
                    id: id.to_string(),
                    title: title.to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn unrestricted(mut self) -> Self {
        self.permissions.permissions.insert("*".to_string());
        self
    }

    pub fn push_batch(&self, batch: Result<Vec<Record>>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn windows(&self) -> Vec<Window> {
        self.windows.lock().unwrap().clone()
    }
}

pub fn record(message: &str) -> Record {
    let mut record = Record::new();
    record.insert("message".into(), serde_json::Value::String(message.into()));
    record
}

#[async_trait::async_trait]
impl SearchBackend for FakeBackend {
    async fn search(&self, query: &SearchQuery, window: Window) -> Result<Vec<Record>> {
        self.windows.lock().unwrap().push(window);
        self.searches.lock().unwrap().push(query.clone());
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn terms(&self, _query: &TermQuery, window: Window) -> Result<Terms> {
        self.windows.lock().unwrap().push(window);
        Ok(self.terms.clone())
    }

    async fn streams(&self) -> Result<Vec<Stream>> {
        *self.stream_calls.lock().unwrap() += 1;
        Ok(self.streams.clone())
    }

    async fn user_info(&self, username: &str) -> Result<UserPermissions> {
        if username.is_empty() {
            return Err(Error::Backend {
                status: 404,
                message: "no such user".into(),
            });
        }
        Ok(self.permissions.clone())
    }

    fn default_stream(&self) -> Option<&str> {
        self.default_stream.as_deref()
    }
}
