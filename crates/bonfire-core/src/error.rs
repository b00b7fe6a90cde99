//! # Error Taxonomy
//!
//! Input errors (named queries, templates, streams, time expressions) are
//! fatal and reported as-is. Backend errors are never retried: a swallowed
//! follow-mode window would leave a silent hole in the output.

/// Everything that can stop a query or poll.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no stored query named '{0}'")]
    UnknownNamedQuery(String),

    #[error("template references undefined placeholder '${{{0}}}'")]
    UndefinedPlaceholder(String),

    #[error("invalid placeholder in template '{template}' at offset {offset}")]
    InvalidPlaceholder { template: String, offset: usize },

    #[error("template option '{0}' is not of the form key=value")]
    InvalidTemplateOption(String),

    #[error("stream {0} not found on server")]
    StreamNotFound(String),

    #[error("invalid stream selection '{input}' ({count} streams available)")]
    InvalidStreamIndex { input: String, count: usize },

    #[error("{0} requires an interactive terminal")]
    InteractiveInputRequired(String),

    #[error("invalid time expression '{expr}': {reason}")]
    InvalidTimeExpression { expr: String, reason: String },

    #[error("search range starts at {from} which is after its end {to}")]
    InvalidTimeRange { from: String, to: String },

    #[error("value-list mode needs at least one field to enumerate")]
    MissingTermField,

    #[error("invalid server address '{0}'")]
    InvalidEndpoint(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[source] reqwest::Error),

    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("failed to write output")]
    Output(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
