//! # Polling Tail Engine
//!
//! Follow mode: re-issue the search over consecutive windows
//! `[now - (latency + 10s), now - latency)`, `[previous end, now - latency)`,
//! ... and forward each batch to the sink before sleeping for the poll
//! interval. The delay is fixed, not a fixed rate; drift is not corrected.
//!
//! Cancellation is observed only between a finished poll and the next one.
//! A failed poll ends the run with the error: skipping a window would drop
//! its records for good.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Local, SubsecRound};
use tokio::sync::watch;

use crate::backend::{QueryOutcome, SearchBackend};
use crate::clock::Clock;
use crate::error::Result;
use crate::query::{Limit, QueryModel, SearchQuery};
use crate::range::TimeRange;
use crate::sink::OutputSink;

pub const DEFAULT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_LATENCY_SECS: u64 = 2;

/// Follow-mode knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between the end of one poll and the start of the next.
    pub interval_ms: u64,
    /// Assumed delay before a log event becomes searchable.
    pub latency_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            latency_secs: DEFAULT_LATENCY_SECS,
        }
    }
}

/// Per-run polling state. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    pub last_window_end: DateTime<Local>,
    pub poll_interval_ms: u64,
    pub latency_secs: u64,
}

impl PollState {
    fn latency(&self) -> Duration {
        Duration::seconds(self.latency_secs as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Init,
    Polling,
    Stopped,
}

/// Totals reported when follow mode stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub polls: u64,
    pub records: u64,
}

pub struct TailEngine<C: Clock> {
    query: SearchQuery,
    poll: PollState,
    clock: C,
    state: TailState,
    summary: PollSummary,
}

impl<C: Clock> TailEngine<C> {
    /// Enter follow mode: no limit, backend order, and the pre-rolled first
    /// window replacing whatever range the query had.
    pub fn new(mut query: SearchQuery, settings: PollSettings, clock: C) -> Self {
        let latency = Duration::seconds(settings.latency_secs as i64);
        let now = clock.now();

        query.limit = Limit::Unbounded;
        query.sort = None;
        query.range = TimeRange::follow(now, latency);

        // Same instant as the first window's end.
        let poll = PollState {
            last_window_end: (now - latency).trunc_subsecs(3),
            poll_interval_ms: settings.interval_ms,
            latency_secs: settings.latency_secs,
        };

        Self {
            query,
            poll,
            clock,
            state: TailState::Init,
            summary: PollSummary::default(),
        }
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    /// The query as it will be sent next, including the current window.
    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn poll_state(&self) -> &PollState {
        &self.poll
    }

    pub fn summary(&self) -> PollSummary {
        self.summary
    }

    /// Run one poll: search the current window, forward the batch, advance.
    /// Returns the number of records forwarded.
    pub async fn poll_once<B, S>(&mut self, backend: &B, sink: &mut S) -> Result<usize>
    where
        B: SearchBackend + ?Sized,
        S: OutputSink + ?Sized,
    {
        self.state = TailState::Polling;
        let window = self.query.range.resolve(self.clock.now())?;

        let forwarded = if window.is_empty() {
            0
        } else {
            let batch = backend.search(&self.query, window).await?;
            sink.emit(&batch, self.query.fields.as_deref())?;
            batch.len()
        };
        tracing::debug!(
            from = %window.from(),
            to = %window.to(),
            records = forwarded,
            "poll complete"
        );

        self.summary.polls += 1;
        self.summary.records += forwarded as u64;
        self.poll.last_window_end = window.to();
        let latency = self.poll.latency();
        self.query.range.advance(self.clock.now(), latency)?;
        Ok(forwarded)
    }

    /// Poll until `cancel` turns `true`. A dropped sender never cancels.
    pub async fn run<B, S>(
        mut self,
        backend: &B,
        sink: &mut S,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<PollSummary>
    where
        B: SearchBackend + ?Sized,
        S: OutputSink + ?Sized,
    {
        let interval = StdDuration::from_millis(self.poll.poll_interval_ms);
        tracing::info!(
            interval_ms = self.poll.poll_interval_ms,
            latency_secs = self.poll.latency_secs,
            "following"
        );

        while !*cancel.borrow_and_update() {
            if let Err(e) = self.poll_once(backend, sink).await {
                self.state = TailState::Stopped;
                return Err(e);
            }
            if *cancel.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                Ok(()) = cancel.changed() => {}
            }
        }

        self.state = TailState::Stopped;
        Ok(self.summary)
    }
}

/// Execute `model` once over its own range and hand the result to `sink`.
/// Returns the number of records or distinct values rendered.
pub async fn run_once<B, S>(
    backend: &B,
    model: &QueryModel,
    sink: &mut S,
    now: DateTime<Local>,
) -> Result<usize>
where
    B: SearchBackend + ?Sized,
    S: OutputSink + ?Sized,
{
    let window = model.range().resolve(now)?;
    match backend.execute(model, window).await? {
        QueryOutcome::Records(records) => {
            let fields = match model {
                QueryModel::Search(query) => query.fields.as_deref(),
                QueryModel::Terms(_) => None,
            };
            sink.emit(&records, fields)?;
            Ok(records.len())
        }
        QueryOutcome::Terms(terms) => {
            sink.emit_terms(&terms)?;
            Ok(terms.len())
        }
    }
}
