//! # Graylog REST Adapter
//!
//! [`SearchBackend`] over the Graylog universal-search API. Windows are
//! half-open; Graylog's absolute search includes both bounds, so the wire
//! `to` is the last included millisecond.

use chrono::{DateTime, Local, Utc};
use reqwest::header::ACCEPT;
use reqwest::Url;
use std::fmt;

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use super::{Record, SearchBackend, Stream, Terms, UserPermissions};
use crate::error::{Error, Result};
use crate::query::{SearchQuery, TermQuery};
use crate::range::Window;

/// Default Graylog REST port.
pub const DEFAULT_PORT: u16 = 12900;

/// Connection settings for one Graylog node, fully resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    /// API prefix, e.g. `/` or `/api`.
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub proxy: Option<String>,
    pub default_stream: Option<String>,
}

impl NodeConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        let endpoint = self.endpoint.trim_matches('/');
        if endpoint.is_empty() {
            format!("{}://{}:{}/", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}/", scheme, self.host, self.port, endpoint)
        }
    }
}

pub struct GraylogBackend {
    client: reqwest::Client,
    base: Url,
    username: String,
    password: String,
    default_stream: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    messages: Vec<MessageEnvelope>,
}

#[derive(Deserialize)]
struct MessageEnvelope {
    message: Record,
}

#[derive(Deserialize)]
struct TermsResponse {
    #[serde(default, deserialize_with = "ordered_terms")]
    terms: Terms,
}

/// The `terms` object in document order; a map type would re-sort it.
fn ordered_terms<'de, D>(deserializer: D) -> std::result::Result<Terms, D::Error>
where
    D: Deserializer<'de>,
{
    struct TermsVisitor;

    impl<'de> Visitor<'de> for TermsVisitor {
        type Value = Terms;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object of term counts")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Terms, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut terms = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, u64>()? {
                terms.push(entry);
            }
            Ok(terms)
        }
    }

    deserializer.deserialize_map(TermsVisitor)
}

#[derive(Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    streams: Vec<Stream>,
}

impl GraylogBackend {
    pub fn new(node: &NodeConfig) -> Result<Self> {
        let raw = node.base_url();
        let base = Url::parse(&raw).map_err(|_| Error::InvalidEndpoint(raw.clone()))?;
        if base.cannot_be_a_base() {
            return Err(Error::InvalidEndpoint(raw));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = &node.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(Error::BackendUnavailable)?);
        }
        let client = builder.build().map_err(Error::BackendUnavailable)?;

        Ok(Self {
            client,
            base,
            username: node.username.clone(),
            password: node.password.clone(),
            default_stream: node.default_stream.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, params: &[(&str, String)]) -> Result<T> {
        tracing::debug!(url = %url, ?params, "graylog request");
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, "application/json")
            .query(params)
            .send()
            .await
            .map_err(Error::BackendUnavailable)?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.text().await {
                Ok(body) => body,
                Err(e) => format!("<unreadable body: {}>", e),
            };
            return Err(Error::Backend {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<T>().await.map_err(|e| Error::Backend {
            status: status.as_u16(),
            message: format!("unexpected response body: {}", e),
        })
    }
}

/// Graylog's absolute timestamp format, always UTC.
pub fn wire_time(at: DateTime<Local>) -> String {
    at.with_timezone(&Utc)
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

fn window_params(window: Window) -> [(&'static str, String); 2] {
    [
        ("from", wire_time(window.from())),
        ("to", wire_time(window.inclusive_end())),
    ]
}

/// Query parameters for a universal absolute search.
pub fn search_params(query: &SearchQuery, window: Window) -> Vec<(&'static str, String)> {
    let mut params = vec![("query", query.query.clone())];
    params.extend(window_params(window));
    if let Some(filter) = &query.filter {
        params.push(("filter", filter.clone()));
    }
    if let Some(fields) = query.fields.as_ref().filter(|f| !f.is_empty()) {
        params.push(("fields", fields.join(",")));
    }
    if let Some(limit) = query.limit.as_option() {
        params.push(("limit", limit.to_string()));
    }
    if let Some(sort) = &query.sort {
        let order = if query.ascending { "asc" } else { "desc" };
        params.push(("sort", format!("{}:{}", sort, order)));
    }
    params
}

/// Query parameters for a terms request.
pub fn terms_params(query: &TermQuery, window: Window) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("field", query.field.clone()),
        ("query", query.query.clone()),
    ];
    params.extend(window_params(window));
    if let Some(filter) = &query.filter {
        params.push(("filter", filter.clone()));
    }
    params
}

#[async_trait::async_trait]
impl SearchBackend for GraylogBackend {
    async fn search(&self, query: &SearchQuery, window: Window) -> Result<Vec<Record>> {
        let url = self.url(&["search", "universal", "absolute"]);
        let response: SearchResponse = self.get(url, &search_params(query, window)).await?;
        Ok(response.messages.into_iter().map(|m| m.message).collect())
    }

    async fn terms(&self, query: &TermQuery, window: Window) -> Result<Terms> {
        let url = self.url(&["search", "universal", "absolute", "terms"]);
        let response: TermsResponse = self.get(url, &terms_params(query, window)).await?;
        Ok(response.terms)
    }

    async fn streams(&self) -> Result<Vec<Stream>> {
        let response: StreamsResponse = self.get(self.url(&["streams"]), &[]).await?;
        Ok(response.streams)
    }

    async fn user_info(&self, username: &str) -> Result<UserPermissions> {
        self.get(self.url(&["users", username]), &[]).await
    }

    fn default_stream(&self) -> Option<&str> {
        self.default_stream.as_deref()
    }
}
