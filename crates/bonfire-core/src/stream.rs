//! # Stream Resolution
//!
//! Maps a user-supplied stream token (id or title) to a stream id. Without
//! a token, users restricted to specific streams must pick one unless the
//! server has a default stream configured.

use crate::backend::{SearchBackend, Stream};
use crate::error::{Error, Result};

/// How the stream filter is chosen for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStrategy {
    /// Resolve the given id or title.
    Explicit(String),
    /// Query every stream the user can see.
    Unscoped,
    /// Ask the user to choose from the visible streams.
    Prompt,
}

/// The decision table: `{explicit token, unrestricted, default stream}`.
pub fn decide(token: Option<&str>, unrestricted: bool, has_default: bool) -> StreamStrategy {
    match token {
        Some(token) => StreamStrategy::Explicit(token.to_string()),
        None if unrestricted || has_default => StreamStrategy::Unscoped,
        None => StreamStrategy::Prompt,
    }
}

/// Interactive choice among listed streams.
pub trait StreamPrompter {
    /// Show `streams` with their zero-based indices and return the raw
    /// answer. An empty answer selects index 0.
    fn ask(&mut self, streams: &[Stream]) -> Result<String>;
}

/// Exact id match first, then exact title match.
pub fn find_stream<'a>(token: &str, streams: &'a [Stream]) -> Result<&'a Stream> {
    streams
        .iter()
        .find(|s| s.id == token)
        .or_else(|| streams.iter().find(|s| s.title == token))
        .ok_or_else(|| Error::StreamNotFound(token.to_string()))
}

/// Interpret a prompt answer as an index into `streams`.
pub fn pick<'a>(answer: &str, streams: &'a [Stream]) -> Result<&'a Stream> {
    let answer = answer.trim();
    let invalid = || Error::InvalidStreamIndex {
        input: answer.to_string(),
        count: streams.len(),
    };
    let index = if answer.is_empty() {
        0
    } else {
        answer.parse::<usize>().map_err(|_| invalid())?
    };
    streams.get(index).ok_or_else(invalid)
}

/// Resolve the stream to scope the query to, if any.
pub async fn resolve<B, P>(
    backend: &B,
    username: &str,
    token: Option<&str>,
    prompter: &mut P,
) -> Result<Option<String>>
where
    B: SearchBackend + ?Sized,
    P: StreamPrompter + ?Sized,
{
    let strategy = match token {
        Some(token) => StreamStrategy::Explicit(token.to_string()),
        None => {
            let permissions = backend.user_info(username).await?;
            decide(
                None,
                permissions.is_unrestricted(),
                backend.default_stream().is_some(),
            )
        }
    };
    tracing::debug!(?strategy, "stream resolution");

    match strategy {
        StreamStrategy::Unscoped => Ok(None),
        StreamStrategy::Explicit(token) => {
            let streams = backend.streams().await?;
            let stream = find_stream(&token, &streams)?;
            Ok(Some(stream.id.clone()))
        }
        StreamStrategy::Prompt => {
            let streams = backend.streams().await?;
            let answer = prompter.ask(&streams)?;
            let stream = pick(&answer, &streams)?;
            tracing::info!(id = %stream.id, title = %stream.title, "stream selected");
            Ok(Some(stream.id.clone()))
        }
    }
}
