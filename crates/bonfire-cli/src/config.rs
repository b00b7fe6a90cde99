//! # Configuration
//!
//! Nodes and stored queries from `./bonfire.toml` and `~/.bonfire.toml`
//! (later file wins per section), or from a single `--config` file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use bonfire_core::backend::graylog::DEFAULT_PORT;
use bonfire_core::{NamedQuery, NodeConfig};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "bonfire.toml";
pub const HOME_CONFIG_FILE: &str = ".bonfire.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Node label used when neither `--node` nor `--host` is given.
    pub node: Option<String>,
    #[serde(default)]
    pub nodes: HashMap<String, NodeSection>,
    #[serde(default)]
    pub queries: HashMap<String, NamedQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub proxy: Option<String>,
    pub default_stream: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_endpoint() -> String {
    "/".into()
}

impl Config {
    /// Load `explicit` alone, or merge the default locations that exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::read(path);
        }

        let mut config = Self::default();
        for path in default_paths() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "reading config");
                config.merge(Self::read(&path)?);
            }
        }
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    fn merge(&mut self, other: Config) {
        if other.node.is_some() {
            self.node = other.node;
        }
        self.nodes.extend(other.nodes);
        self.queries.extend(other.queries);
    }
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(HOME_CONFIG_FILE));
    }
    paths
}

/// Connection flags from the command line.
#[derive(Debug, Clone, Default)]
pub struct NodeArgs {
    pub node: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    pub tls: bool,
    pub endpoint: String,
    pub proxy: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Pick the node to talk to: `--node`, then `--host`, then the configured
/// default node, then a node named `default`.
pub fn resolve_node(config: &Config, args: &NodeArgs) -> Result<NodeConfig> {
    let section = if let Some(label) = &args.node {
        config
            .nodes
            .get(label)
            .cloned()
            .ok_or_else(|| anyhow!("no node named '{}' in the configuration", label))?
    } else if let Some(host) = &args.host {
        NodeSection {
            host: host.clone(),
            port: args.port,
            tls: args.tls,
            endpoint: args.endpoint.clone(),
            username: None,
            password: None,
            proxy: None,
            default_stream: None,
        }
    } else {
        let label = config.node.as_deref().unwrap_or("default");
        match config.nodes.get(label) {
            Some(section) => section.clone(),
            None => bail!("no host or node configuration specified and no default found"),
        }
    };

    let username = args
        .username
        .clone()
        .or(section.username)
        .ok_or_else(|| anyhow!("no username for {}: pass --username", section.host))?;
    let password = args
        .password
        .clone()
        .or(section.password)
        .ok_or_else(|| {
            anyhow!(
                "no password for {}@{}: pass --password or set BONFIRE_PASSWORD",
                username,
                section.host
            )
        })?;

    Ok(NodeConfig {
        host: section.host,
        port: section.port,
        tls: section.tls,
        endpoint: section.endpoint,
        username,
        password,
        proxy: args.proxy.clone().or(section.proxy),
        default_stream: section.default_stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
node = "prod"

[nodes.prod]
host = "graylog.example.com"
tls = true
endpoint = "/api"
username = "alice"
password = "secret"
default_stream = "5400abc"

[nodes.default]
host = "localhost"

[queries.slow]
query = "status:500 AND day:${today}"
limit = 20
sort = "timestamp"
asc = true
fields = "message,source"
"#;

    fn args() -> NodeArgs {
        NodeArgs {
            port: DEFAULT_PORT,
            endpoint: "/".into(),
            ..NodeArgs::default()
        }
    }

    #[test]
    fn test_parse_sample_config() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.node.as_deref(), Some("prod"));
        assert_eq!(config.nodes["default"].port, 12900);
        assert_eq!(config.nodes["default"].endpoint, "/");
        let slow = &config.queries["slow"];
        assert_eq!(slow.limit, Some(20));
        assert_eq!(slow.asc, Some(true));
        assert_eq!(slow.from, None);
    }

    #[test]
    fn test_unknown_query_option_is_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("[queries.x]\nlimt = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_configured_default_node() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let node = resolve_node(&config, &args()).unwrap();
        assert_eq!(node.host, "graylog.example.com");
        assert!(node.tls);
        assert_eq!(node.base_url(), "https://graylog.example.com:12900/api/");
        assert_eq!(node.default_stream.as_deref(), Some("5400abc"));
    }

    #[test]
    fn test_flags_override_node_credentials() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let node = resolve_node(
            &config,
            &NodeArgs {
                node: Some("prod".into()),
                username: Some("bob".into()),
                password: Some("hunter2".into()),
                proxy: Some("http://proxy:3128".into()),
                ..args()
            },
        )
        .unwrap();
        assert_eq!(node.username, "bob");
        assert_eq!(node.password, "hunter2");
        assert_eq!(node.proxy.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn test_ad_hoc_host_needs_credentials() {
        let config = Config::default();
        let host_only = NodeArgs {
            host: Some("10.0.0.5".into()),
            ..args()
        };
        let err = resolve_node(&config, &host_only).unwrap_err();
        assert!(err.to_string().contains("username"));

        let node = resolve_node(
            &config,
            &NodeArgs {
                username: Some("u".into()),
                password: Some("p".into()),
                ..host_only
            },
        )
        .unwrap();
        assert_eq!(node.base_url(), "http://10.0.0.5:12900/");
    }

    #[test]
    fn test_missing_node_is_an_error() {
        let config = Config::default();
        assert!(resolve_node(&config, &args()).is_err());
        let named = NodeArgs {
            node: Some("staging".into()),
            ..args()
        };
        assert!(resolve_node(&config, &named).is_err());
    }

    #[test]
    fn test_explicit_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert!(config.queries.contains_key("slow"));
    }

    #[test]
    fn test_later_file_wins_per_section() {
        let mut base: Config = toml::from_str(SAMPLE).unwrap();
        let home: Config = toml::from_str(
            "[queries.slow]\nquery = \"status:503\"\n\n[queries.mine]\nquery = \"user:me\"\n",
        )
        .unwrap();
        base.merge(home);
        assert_eq!(base.queries["slow"].query.as_deref(), Some("status:503"));
        assert_eq!(base.queries["slow"].limit, None);
        assert!(base.queries.contains_key("mine"));
        assert_eq!(base.node.as_deref(), Some("prod"));
    }
}
