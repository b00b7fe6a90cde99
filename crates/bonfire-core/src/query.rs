//! # Query Model
//!
//! The two request shapes the search backend understands. Search queries
//! return documents; term queries return the distinct values of one field.
//! [`QueryModel`] is closed so no code path can build a hybrid request.

use crate::range::TimeRange;

/// Wildcard query text matching every document.
pub const WILDCARD: &str = "*";

/// Maximum number of records a search may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    Bounded(u64),
    #[default]
    Unbounded,
}

impl Limit {
    /// Any requested limit `<= 0` means "no limit".
    pub fn from_requested(requested: i64) -> Self {
        if requested <= 0 {
            Self::Unbounded
        } else {
            Self::Bounded(requested as u64)
        }
    }

    pub fn as_option(&self) -> Option<u64> {
        match self {
            Self::Bounded(n) => Some(*n),
            Self::Unbounded => None,
        }
    }
}

/// Full-text search with an optional filter, field projection and sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub range: TimeRange,
    pub limit: Limit,
    pub filter: Option<String>,
    /// Fields to return, in display order.
    pub fields: Option<Vec<String>>,
    pub sort: Option<String>,
    pub ascending: bool,
}

/// Distinct values (with counts) of a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermQuery {
    pub query: String,
    pub range: TimeRange,
    pub filter: Option<String>,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryModel {
    Search(SearchQuery),
    Terms(TermQuery),
}

impl QueryModel {
    pub fn query_text(&self) -> &str {
        match self {
            Self::Search(q) => &q.query,
            Self::Terms(q) => &q.query,
        }
    }

    pub fn range(&self) -> &TimeRange {
        match self {
            Self::Search(q) => &q.range,
            Self::Terms(q) => &q.range,
        }
    }

    pub fn filter(&self) -> Option<&str> {
        match self {
            Self::Search(q) => q.filter.as_deref(),
            Self::Terms(q) => q.filter.as_deref(),
        }
    }

    /// Restrict the query to a single stream.
    pub fn scope_to_stream(&mut self, stream_id: &str) {
        let clause = stream_filter(stream_id);
        let filter = match self {
            Self::Search(q) => &mut q.filter,
            Self::Terms(q) => &mut q.filter,
        };
        *filter = Some(match filter.take() {
            Some(existing) if !existing.is_empty() => format!("{} AND {}", existing, clause),
            _ => clause,
        });
    }
}

/// The filter clause selecting one stream.
pub fn stream_filter(stream_id: &str) -> String {
    format!("streams:{}", stream_id)
}
