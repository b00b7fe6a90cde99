//! # bonfire-core: The Engine of BONFIRE
//!
//! Query resolution and follow-mode polling against a remote log-search
//! service:
//!
//! - [`template`]: `${name}` substitution in stored queries.
//! - [`request`]: `:name` stored queries layered over caller options.
//! - [`range`]: relative/absolute time ranges and resolved windows.
//! - [`stream`]: stream id/title resolution and interactive selection.
//! - [`query`]: the search / term request model.
//! - [`tail`]: the polling tail engine and one-shot execution.
//! - [`backend`]: the backend boundary and the Graylog REST adapter.
//!
//! Nothing here reads the environment, the home directory or the terminal;
//! callers pass configuration, credentials, a clock and a prompter in.

pub mod backend;
pub mod clock;
pub mod error;
pub mod query;
pub mod range;
pub mod request;
pub mod sink;
pub mod stream;
pub mod tail;
pub mod template;

pub use backend::graylog::{GraylogBackend, NodeConfig};
pub use backend::{QueryOutcome, Record, SearchBackend, Stream, Terms, UserPermissions};
pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
pub use query::{Limit, QueryModel, SearchQuery, TermQuery};
pub use range::{TimePoint, TimeRange, Window};
pub use request::{
    prepare, LoadedQuery, Mode, NamedQuery, NamedQueryLoader, PreparedQuery, QueryOptions, Warning,
};
pub use sink::OutputSink;
pub use stream::StreamPrompter;
pub use tail::{run_once, PollSettings, PollSummary, TailEngine, TailState};
pub use template::TemplateVars;
