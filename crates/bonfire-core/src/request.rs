//! # Request Assembly
//!
//! Turns the raw query tokens and caller options into a [`QueryModel`].
//!
//! A first token starting with `:` names a stored query. Each option of the
//! stored definition overrides the caller's value for that option only;
//! options it leaves out keep the caller's value.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::query::{Limit, QueryModel, SearchQuery, TermQuery, WILDCARD};
use crate::range::{TimePoint, TimeRange};
use crate::template::{self, TemplateVars};

/// Marks a query token as a reference to a stored query.
pub const NAMED_QUERY_SIGIL: char = ':';

pub const DEFAULT_LIMIT: i64 = 10;

pub const DEFAULT_FIELDS: [&str; 5] = ["message", "source", "facility", "line", "module"];

/// What the run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Human-readable lines.
    Tail,
    /// CSV.
    Dump,
    /// Distinct values of one field.
    ValueList,
}

/// A stored query definition. String options are templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedQuery {
    pub query: Option<String>,
    pub limit: Option<i64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub sort: Option<String>,
    pub asc: Option<bool>,
    /// Comma-separated; replaces the caller's field list.
    pub fields: Option<String>,
    pub stream: Option<String>,
}

/// Caller-supplied query options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub limit: i64,
    pub from: Option<String>,
    pub to: Option<String>,
    pub sort: Option<String>,
    pub ascending: bool,
    pub fields: Vec<String>,
    pub stream: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            from: None,
            to: None,
            sort: None,
            ascending: false,
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            stream: None,
        }
    }
}

/// Non-fatal conditions reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Value-list mode enumerates over every document, so the stored query
    /// and any extra query tokens are not used.
    StoredQueryIgnored { name: String, dropped: Vec<String> },
    /// Same rule for literal query terms.
    QueryIgnored { dropped: Vec<String> },
    /// Follow has no meaning for a value list.
    FollowIgnored,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StoredQueryIgnored { name, dropped } if dropped.is_empty() => write!(
                f,
                "value-list mode ignores the query stored as '{}'",
                name
            ),
            Self::StoredQueryIgnored { name, dropped } => write!(
                f,
                "value-list mode ignores the query stored as '{}' and the query terms '{}'",
                name,
                dropped.join(" ")
            ),
            Self::QueryIgnored { dropped } => write!(
                f,
                "value-list mode lists values over all messages; ignoring the query '{}'",
                dropped.join(" ")
            ),
            Self::FollowIgnored => write!(f, "follow is ignored in value-list mode"),
        }
    }
}

fn warn(warnings: &mut Vec<Warning>, warning: Warning) {
    tracing::warn!("{}", warning);
    warnings.push(warning);
}

/// Query text plus options after stored-query layering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedQuery {
    pub query: String,
    pub options: QueryOptions,
    /// Name of the stored query used, if any.
    pub named: Option<String>,
    pub warnings: Vec<Warning>,
}

/// Resolves `:name` tokens against the stored queries.
pub struct NamedQueryLoader<'a> {
    queries: &'a HashMap<String, NamedQuery>,
}

impl<'a> NamedQueryLoader<'a> {
    pub fn new(queries: &'a HashMap<String, NamedQuery>) -> Self {
        Self { queries }
    }

    pub fn load(
        &self,
        tokens: &[String],
        mode: Mode,
        vars: &TemplateVars,
        defaults: QueryOptions,
        now: DateTime<Local>,
    ) -> Result<LoadedQuery> {
        let Some((first, extra)) = tokens.split_first() else {
            return Ok(LoadedQuery {
                query: WILDCARD.to_string(),
                options: defaults,
                named: None,
                warnings: Vec::new(),
            });
        };

        let Some(name) = first.strip_prefix(NAMED_QUERY_SIGIL) else {
            let mut warnings = Vec::new();
            let query = if mode == Mode::ValueList {
                if tokens.iter().any(|t| t != WILDCARD) {
                    warn(
                        &mut warnings,
                        Warning::QueryIgnored {
                            dropped: tokens.to_vec(),
                        },
                    );
                }
                WILDCARD.to_string()
            } else {
                tokens.join(" ")
            };
            return Ok(LoadedQuery {
                query,
                options: defaults,
                named: None,
                warnings,
            });
        };

        let stored = self
            .queries
            .get(name)
            .ok_or_else(|| Error::UnknownNamedQuery(name.to_string()))?;
        let render = |raw: &str| template::render(raw, vars, now);

        let mut warnings = Vec::new();
        let mut options = defaults;

        let query = if mode == Mode::ValueList {
            warn(
                &mut warnings,
                Warning::StoredQueryIgnored {
                    name: name.to_string(),
                    dropped: extra.to_vec(),
                },
            );
            WILDCARD.to_string()
        } else {
            let base = match &stored.query {
                Some(query) => render(query)?,
                None => WILDCARD.to_string(),
            };
            if extra.is_empty() {
                base
            } else {
                format!("{} AND {}", base, extra.join(" "))
            }
        };

        if mode != Mode::ValueList {
            if let Some(limit) = stored.limit {
                options.limit = limit;
            }
            if let Some(from) = &stored.from {
                options.from = Some(render(from)?);
            }
            if let Some(to) = &stored.to {
                options.to = Some(render(to)?);
            }
            if let Some(sort) = &stored.sort {
                options.sort = Some(render(sort)?);
            }
            if let Some(asc) = stored.asc {
                options.ascending = asc;
            }
            if let Some(fields) = &stored.fields {
                options.fields = render(fields)?
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect();
            }
        }
        if let Some(stream) = &stored.stream {
            options.stream = Some(render(stream)?);
        }

        tracing::debug!(name, %query, "loaded stored query");
        Ok(LoadedQuery {
            query,
            options,
            named: Some(name.to_string()),
            warnings,
        })
    }
}

/// A ready-to-run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    pub model: QueryModel,
    pub follow: bool,
    /// Stream token still to be resolved against the backend.
    pub stream: Option<String>,
    pub warnings: Vec<Warning>,
}

/// Apply time-range defaults, limit normalization and mode rules.
pub fn prepare(
    loaded: LoadedQuery,
    mode: Mode,
    follow: bool,
    now: DateTime<Local>,
) -> Result<PreparedQuery> {
    let LoadedQuery {
        query,
        options,
        mut warnings,
        ..
    } = loaded;

    let to = options
        .to
        .as_deref()
        .map(|to| TimePoint::parse(to, now))
        .transpose()?;
    let range = match options.from.as_deref() {
        Some(from) => TimeRange::new(TimePoint::parse(from, now)?, to),
        None if mode == Mode::ValueList => TimeRange::last_day(now),
        None => TimeRange { to, ..TimeRange::recent() },
    };

    let follow = if follow && mode == Mode::ValueList {
        warn(&mut warnings, Warning::FollowIgnored);
        false
    } else {
        follow
    };

    let model = match mode {
        Mode::ValueList => {
            let field = options.fields.first().cloned().ok_or(Error::MissingTermField)?;
            QueryModel::Terms(TermQuery {
                query,
                range,
                filter: None,
                field,
            })
        }
        Mode::Tail | Mode::Dump => QueryModel::Search(SearchQuery {
            query,
            range,
            limit: Limit::from_requested(options.limit),
            filter: None,
            fields: (!options.fields.is_empty()).then_some(options.fields),
            sort: options.sort,
            ascending: options.ascending,
        }),
    };

    Ok(PreparedQuery {
        model,
        follow,
        stream: options.stream,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::DEFAULT_FROM;
    use chrono::{Duration, TimeZone};

    fn clock() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).single().unwrap()
    }

    fn tokens(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    fn stored() -> HashMap<String, NamedQuery> {
        let mut queries = HashMap::new();
        queries.insert(
            "slow".to_string(),
            NamedQuery {
                query: Some("status:500".into()),
                ..NamedQuery::default()
            },
        );
        queries.insert(
            "errors".to_string(),
            NamedQuery {
                query: Some("level:error".into()),
                limit: Some(50),
                stream: Some("${env}-web".into()),
                ..NamedQuery::default()
            },
        );
        queries.insert(
            "pinned".to_string(),
            NamedQuery {
                query: Some("day:${today}".into()),
                sort: Some("timestamp".into()),
                fields: Some("message, host".into()),
                from: Some("1 hour ago".into()),
                ..NamedQuery::default()
            },
        );
        queries
    }

    fn load(queries: &HashMap<String, NamedQuery>, t: &[&str], mode: Mode) -> Result<LoadedQuery> {
        let vars = TemplateVars::parse(["env=prod"]).unwrap();
        NamedQueryLoader::new(queries).load(&tokens(t), mode, &vars, QueryOptions::default(), clock())
    }

    #[test]
    fn test_literal_query_dump_mode() {
        let queries = stored();
        let loaded = load(&queries, &["error", "AND", "host:db1"], Mode::Dump).unwrap();
        assert_eq!(loaded.named, None);
        let prepared = prepare(loaded, Mode::Dump, false, clock()).unwrap();

        let QueryModel::Search(search) = prepared.model else {
            panic!("expected a search query");
        };
        assert_eq!(search.query, "error AND host:db1");
        assert_eq!(search.range.from, TimePoint::Expr(DEFAULT_FROM.into()));
        assert_eq!(search.range.to, None);
        let window = search.range.resolve(clock()).unwrap();
        assert_eq!(window.from(), clock() - Duration::minutes(5));
        assert_eq!(window.to(), clock());
        assert_eq!(search.limit, Limit::Bounded(10));
        assert!(prepared.warnings.is_empty());
    }

    #[test]
    fn test_empty_tokens_mean_wildcard() {
        let queries = stored();
        assert_eq!(load(&queries, &[], Mode::Tail).unwrap().query, "*");
    }

    #[test]
    fn test_named_query_with_extra_tokens_is_conjunction() {
        let queries = stored();
        let loaded = load(&queries, &[":slow", "host:api2"], Mode::Tail).unwrap();
        assert_eq!(loaded.query, "status:500 AND host:api2");
        assert_eq!(loaded.named.as_deref(), Some("slow"));
    }

    #[test]
    fn test_named_query_without_extra_tokens() {
        let queries = stored();
        assert_eq!(load(&queries, &[":slow"], Mode::Tail).unwrap().query, "status:500");
    }

    #[test]
    fn test_named_query_without_query_text_matches_everything() {
        let mut queries = stored();
        queries.insert("all".into(), NamedQuery::default());
        assert_eq!(load(&queries, &[":all", "x"], Mode::Tail).unwrap().query, "* AND x");
    }

    #[test]
    fn test_value_list_discards_stored_query_with_warning() {
        let queries = stored();
        let loaded = load(&queries, &[":errors"], Mode::ValueList).unwrap();
        assert_eq!(loaded.query, "*");
        assert_eq!(
            loaded.warnings,
            vec![Warning::StoredQueryIgnored {
                name: "errors".into(),
                dropped: vec![],
            }]
        );
        // only the stream option survives in value-list mode
        assert_eq!(loaded.options.limit, DEFAULT_LIMIT);
        assert_eq!(loaded.options.stream.as_deref(), Some("prod-web"));
    }

    #[test]
    fn test_value_list_replaces_literal_query_with_wildcard() {
        let queries = stored();
        let loaded = load(&queries, &["level:error", "host:a"], Mode::ValueList).unwrap();
        assert_eq!(
            loaded.warnings,
            vec![Warning::QueryIgnored {
                dropped: tokens(&["level:error", "host:a"]),
            }]
        );
        let prepared = prepare(loaded, Mode::ValueList, false, clock()).unwrap();
        assert_eq!(prepared.model.query_text(), "*");
        assert!(prepared.warnings[0].to_string().contains("level:error host:a"));

        let loaded = load(&queries, &["*"], Mode::ValueList).unwrap();
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_value_list_warning_names_dropped_tokens() {
        let queries = stored();
        let loaded = load(&queries, &[":errors", "host:a"], Mode::ValueList).unwrap();
        assert!(loaded.warnings[0].to_string().contains("host:a"));
    }

    #[test]
    fn test_stored_options_override_per_field() {
        let queries = stored();
        let defaults = QueryOptions {
            limit: 25,
            ascending: true,
            stream: Some("cli-stream".into()),
            ..QueryOptions::default()
        };
        let loaded = NamedQueryLoader::new(&queries)
            .load(&tokens(&[":pinned"]), Mode::Tail, &TemplateVars::new(), defaults, clock())
            .unwrap();

        assert_eq!(loaded.query, "day:2024-03-05");
        // set in the stored definition
        assert_eq!(loaded.options.sort.as_deref(), Some("timestamp"));
        assert_eq!(loaded.options.from.as_deref(), Some("1 hour ago"));
        assert_eq!(loaded.options.fields, vec!["message", "host"]);
        // left to the caller
        assert_eq!(loaded.options.limit, 25);
        assert!(loaded.options.ascending);
        assert_eq!(loaded.options.stream.as_deref(), Some("cli-stream"));
        assert_eq!(loaded.options.to, None);
    }

    #[test]
    fn test_unknown_named_query_fails() {
        let queries = stored();
        let err = load(&queries, &[":missing"], Mode::Tail).unwrap_err();
        assert!(matches!(err, Error::UnknownNamedQuery(ref n) if n == "missing"));
    }

    #[test]
    fn test_undefined_placeholder_in_stored_query_fails() {
        let mut queries = HashMap::new();
        queries.insert(
            "bad".to_string(),
            NamedQuery {
                query: Some("host:${host}".into()),
                ..NamedQuery::default()
            },
        );
        let err = load(&queries, &[":bad"], Mode::Tail).unwrap_err();
        assert!(matches!(err, Error::UndefinedPlaceholder(_)));
    }

    #[test]
    fn test_value_list_defaults_to_pinned_last_day() {
        let queries = stored();
        let loaded = load(&queries, &["*"], Mode::ValueList).unwrap();
        let prepared = prepare(loaded, Mode::ValueList, false, clock()).unwrap();
        let QueryModel::Terms(terms) = prepared.model else {
            panic!("expected a term query");
        };
        assert_eq!(terms.field, "message");
        assert!(terms.range.relative);
        assert_eq!(terms.range.from, TimePoint::At(clock() - Duration::days(1)));
        assert_eq!(terms.range.to, Some(TimePoint::At(clock())));
    }

    #[test]
    fn test_follow_with_value_list_is_ignored() {
        let queries = stored();
        let loaded = load(&queries, &["*"], Mode::ValueList).unwrap();
        let prepared = prepare(loaded, Mode::ValueList, true, clock()).unwrap();
        assert!(!prepared.follow);
        assert_eq!(prepared.warnings, vec![Warning::FollowIgnored]);
    }

    #[test]
    fn test_value_list_needs_a_field() {
        let loaded = LoadedQuery {
            query: "*".into(),
            options: QueryOptions {
                fields: vec![],
                ..QueryOptions::default()
            },
            named: None,
            warnings: vec![],
        };
        assert!(matches!(
            prepare(loaded, Mode::ValueList, false, clock()),
            Err(Error::MissingTermField)
        ));
    }

    #[test]
    fn test_non_positive_limit_is_unbounded() {
        let queries = stored();
        let defaults = QueryOptions {
            limit: 0,
            ..QueryOptions::default()
        };
        let loaded = NamedQueryLoader::new(&queries)
            .load(&tokens(&["x"]), Mode::Tail, &TemplateVars::new(), defaults, clock())
            .unwrap();
        let prepared = prepare(loaded, Mode::Tail, false, clock()).unwrap();
        let QueryModel::Search(search) = prepared.model else {
            panic!("expected a search query");
        };
        assert_eq!(search.limit, Limit::Unbounded);
    }

    #[test]
    fn test_stored_relative_from_tracks_the_clock() {
        let queries = stored();
        let loaded = load(&queries, &[":pinned"], Mode::Tail).unwrap();
        let prepared = prepare(loaded, Mode::Tail, false, clock()).unwrap();
        let range = prepared.model.range();
        assert!(range.relative);

        let later = clock() + Duration::minutes(20);
        let window = range.resolve(later).unwrap();
        assert_eq!(window.from(), later - Duration::hours(1));
        assert_eq!(window.to(), later);
    }

    #[test]
    fn test_explicit_range_is_parsed() {
        let loaded = LoadedQuery {
            query: "x".into(),
            options: QueryOptions {
                from: Some("2024-03-01 00:00:00".into()),
                to: Some("now".into()),
                ..QueryOptions::default()
            },
            named: None,
            warnings: vec![],
        };
        let prepared = prepare(loaded, Mode::Tail, false, clock()).unwrap();
        let range = prepared.model.range();
        assert!(!range.relative);
        assert_eq!(range.to, Some(TimePoint::Expr("now".into())));
        let window = range.resolve(clock()).unwrap();
        assert_eq!(
            window.from(),
            Local.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().unwrap()
        );
    }
}
