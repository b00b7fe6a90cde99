//! # Search Backend Boundary
//!
//! Everything the client needs from the remote log-search service. The
//! polling engine and the stream resolver only see [`SearchBackend`]; the
//! Graylog REST adapter lives in [`graylog`].

pub mod graylog;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::query::{QueryModel, SearchQuery, TermQuery};
use crate::range::Window;

/// One log record as returned by the backend: opaque field -> value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Distinct field values with their document counts, in backend order.
pub type Terms = Vec<(String, u64)>;

/// A stream as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: String,
    pub title: String,
}

/// The permission set of the querying user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct UserPermissions {
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl UserPermissions {
    /// `true` only for exactly `{"*"}`.
    pub fn is_unrestricted(&self) -> bool {
        self.permissions.len() == 1 && self.permissions.contains("*")
    }
}

/// Result of executing a [`QueryModel`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Records(Vec<Record>),
    Terms(Terms),
}

/// The remote search service.
///
/// Implementations must return records in backend order and must not keep
/// the request past the call. Errors are reported, never retried.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Documents matching `query` inside the half-open `window`.
    async fn search(&self, query: &SearchQuery, window: Window) -> Result<Vec<Record>>;

    /// Distinct values of `query.field` inside `window`.
    async fn terms(&self, query: &TermQuery, window: Window) -> Result<Terms>;

    /// All streams visible to the user, in backend order.
    async fn streams(&self) -> Result<Vec<Stream>>;

    async fn user_info(&self, username: &str) -> Result<UserPermissions>;

    /// Server-side default stream, if one is configured.
    fn default_stream(&self) -> Option<&str>;

    /// Run whichever request `model` holds.
    async fn execute(&self, model: &QueryModel, window: Window) -> Result<QueryOutcome> {
        match model {
            QueryModel::Search(query) => self.search(query, window).await.map(QueryOutcome::Records),
            QueryModel::Terms(query) => self.terms(query, window).await.map(QueryOutcome::Terms),
        }
    }
}
