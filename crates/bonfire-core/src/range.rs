//! # Time Ranges
//!
//! A [`TimeRange`] is what the user asked for ("5 minutes ago" until now);
//! a [`Window`] is that range pinned to concrete instants at one moment.
//! Follow mode mutates the range in place as it advances.
//!
//! Windows are half-open `[from, to)` with millisecond precision, so two
//! consecutive follow windows share their boundary instant and a record
//! stamped exactly on it belongs to the later window only.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Local, Months, SubsecRound};
use regex::Regex;

use crate::error::{Error, Result};

/// Default lower bound for tail and dump queries.
pub const DEFAULT_FROM: &str = "5 minutes ago";

/// Extra look-back for the first follow window, covering records that were
/// still being indexed when the process started.
pub const FOLLOW_PREROLL_SECS: i64 = 10;

/// One end of a time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimePoint {
    /// A fixed instant.
    At(DateTime<Local>),
    /// A relative expression ("5 minutes ago", "now"), re-evaluated at each use.
    Expr(String),
}

impl TimePoint {
    /// Parse a user-supplied time expression.
    ///
    /// Absolute expressions are evaluated once and stored as [`TimePoint::At`];
    /// expressions whose value depends on the current time stay as
    /// [`TimePoint::Expr`].
    pub fn parse(expr: &str, now: DateTime<Local>) -> Result<Self> {
        let expr = expr.trim();
        if expr.eq_ignore_ascii_case("now") {
            return Ok(Self::Expr("now".to_string()));
        }

        let here = evaluate(expr, now)?;
        let earlier = evaluate(expr, now - Duration::days(1) - Duration::seconds(1))?;
        if here == earlier {
            Ok(Self::At(here))
        } else {
            Ok(Self::Expr(expr.to_string()))
        }
    }

    /// The instant this point denotes at `now`.
    pub fn resolve(&self, now: DateTime<Local>) -> Result<DateTime<Local>> {
        match self {
            Self::At(at) => Ok(*at),
            Self::Expr(expr) if expr == "now" => Ok(now),
            Self::Expr(expr) => evaluate(expr, now),
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, Self::Expr(_))
    }
}

impl std::fmt::Display for TimePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::At(at) => write!(f, "{}", at.format("%Y-%m-%d %H:%M:%S%.3f")),
            Self::Expr(expr) => write!(f, "{}", expr),
        }
    }
}

/// `<amount> <unit>[, <amount> <unit>...] ago`, or a compact `15m`.
fn offset_span() -> &'static Regex {
    static SPAN: OnceLock<Regex> = OnceLock::new();
    SPAN.get_or_init(|| {
        Regex::new(r"^(\d+)\s*([a-z]+)[\s,]*(?:and\s+)?").expect("offset pattern is valid")
    })
}

fn compact_offset() -> &'static Regex {
    static COMPACT: OnceLock<Regex> = OnceLock::new();
    COMPACT.get_or_init(|| Regex::new(r"^\d+[smhdw]$").expect("offset pattern is valid"))
}

fn step_back(at: DateTime<Local>, amount: u32, unit: &str) -> Option<DateTime<Local>> {
    let amount_i64 = i64::from(amount);
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Some(at - Duration::seconds(amount_i64)),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(at - Duration::minutes(amount_i64)),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(at - Duration::hours(amount_i64)),
        "d" | "day" | "days" => Some(at - Duration::days(amount_i64)),
        "w" | "week" | "weeks" => Some(at - Duration::weeks(amount_i64)),
        "month" | "months" => at.checked_sub_months(Months::new(amount)),
        "y" | "year" | "years" => at.checked_sub_months(Months::new(amount.checked_mul(12)?)),
        _ => None,
    }
}

/// Offsets into the past, counted from the full instant `now`.
fn ago(expr: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let lower = expr.trim().to_ascii_lowercase();
    let body = match lower.strip_suffix("ago") {
        Some(body) => body.trim_end(),
        None if compact_offset().is_match(&lower) => lower.as_str(),
        None => return None,
    };
    if body.is_empty() {
        return None;
    }

    let mut at = now;
    let mut rest = body;
    while !rest.is_empty() {
        let caps = offset_span().captures(rest)?;
        at = step_back(at, caps[1].parse().ok()?, &caps[2])?;
        rest = &rest[caps.get(0)?.end()..];
    }
    Some(at)
}

fn evaluate(expr: &str, now: DateTime<Local>) -> Result<DateTime<Local>> {
    if let Some(at) = ago(expr, now) {
        return Ok(at);
    }
    // Absolute dates and calendar words ("yesterday", "last monday").
    parse_datetime::parse_datetime_at_date(now, expr)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| Error::InvalidTimeExpression {
            expr: expr.to_string(),
            reason: e.to_string(),
        })
}

/// The search window requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub from: TimePoint,
    /// `None` means "now" at evaluation time.
    pub to: Option<TimePoint>,
    /// Shown as a relative range; the bounds themselves may be fixed.
    pub relative: bool,
}

impl TimeRange {
    pub fn new(from: TimePoint, to: Option<TimePoint>) -> Self {
        let relative = from.is_relative();
        Self { from, to, relative }
    }

    /// `DEFAULT_FROM` until now, re-evaluated at every use.
    pub fn recent() -> Self {
        Self::new(TimePoint::Expr(DEFAULT_FROM.to_string()), None)
    }

    /// The 24 hours before `now`, pinned at construction time.
    pub fn last_day(now: DateTime<Local>) -> Self {
        Self {
            from: TimePoint::At(now - Duration::days(1)),
            to: Some(TimePoint::At(now)),
            relative: true,
        }
    }

    /// First follow window: `[now - (latency + preroll), now - latency)`.
    pub fn follow(now: DateTime<Local>, latency: Duration) -> Self {
        let to = (now - latency).trunc_subsecs(3);
        let from = to - Duration::seconds(FOLLOW_PREROLL_SECS);
        Self {
            from: TimePoint::At(from),
            to: Some(TimePoint::At(to)),
            relative: false,
        }
    }

    /// Slide a follow window forward: the old end becomes the new start and
    /// the new end is `now - latency`. Never moves the end backwards.
    pub fn advance(&mut self, now: DateTime<Local>, latency: Duration) -> Result<()> {
        let previous_end = match &self.to {
            Some(point) => point.resolve(now)?,
            None => now,
        }
        .trunc_subsecs(3);
        let next_end = (now - latency).trunc_subsecs(3).max(previous_end);

        self.from = TimePoint::At(previous_end);
        self.to = Some(TimePoint::At(next_end));
        self.relative = false;
        Ok(())
    }

    /// Pin the range to concrete instants.
    pub fn resolve(&self, now: DateTime<Local>) -> Result<Window> {
        let from = self.from.resolve(now)?;
        let to = match &self.to {
            Some(point) => point.resolve(now)?,
            None => now,
        };
        Window::new(from, to)
    }
}

/// A resolved, half-open `[from, to)` window at millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    from: DateTime<Local>,
    to: DateTime<Local>,
}

impl Window {
    pub fn new(from: DateTime<Local>, to: DateTime<Local>) -> Result<Self> {
        let from = from.trunc_subsecs(3);
        let to = to.trunc_subsecs(3);
        if from > to {
            return Err(Error::InvalidTimeRange {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> DateTime<Local> {
        self.from
    }

    pub fn to(&self) -> DateTime<Local> {
        self.to
    }

    /// Nothing can match a window whose bounds coincide.
    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// Last instant included in the window, for backends whose upper bound
    /// is inclusive.
    pub fn inclusive_end(&self) -> DateTime<Local> {
        if self.is_empty() {
            self.to
        } else {
            self.to - Duration::milliseconds(1)
        }
    }
}
