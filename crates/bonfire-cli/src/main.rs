//! # bonfire: The Console of BONFIRE
//!
//! Command-line client for a Graylog server.
//!
//! - `bonfire [QUERY]...`: print the latest matching messages.
//! - `bonfire -f [QUERY]...`: follow new messages until Ctrl-C.
//! - `bonfire -d [QUERY]...`: dump matching messages as CSV.
//! - `bonfire -l -e FIELD [QUERY]...`: list the distinct values of a field.
//!
//! A query starting with `:name` runs the stored query `name` from the
//! configuration, ANDed with any further terms.

mod config;
mod logging;
mod output;
mod prompt;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgGroup, Parser};
use tokio::sync::watch;

use bonfire_core::backend::graylog::DEFAULT_PORT;
use bonfire_core::request::DEFAULT_FIELDS;
use bonfire_core::tail::{DEFAULT_INTERVAL_MS, DEFAULT_LATENCY_SECS};
use bonfire_core::{
    prepare, run_once, Clock, GraylogBackend, Mode, NamedQueryLoader, OutputSink, PollSettings,
    QueryModel, QueryOptions, SystemClock, TailEngine, TemplateVars,
};

use crate::config::{Config, NodeArgs};
use crate::output::{DumpFormatter, TailFormatter};
use crate::prompt::TerminalPrompter;

/// 🔥 BONFIRE: tail, dump and list values from Graylog.
#[derive(Parser, Debug)]
#[command(name = "bonfire", version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").args(["tail", "dump", "value_list"])))]
struct Cli {
    /// Configured node to connect to.
    #[arg(long)]
    node: Option<String>,

    /// Graylog host, bypassing the configured nodes.
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Connect over HTTPS (with --host).
    #[arg(long)]
    tls: bool,

    /// REST API port (with --host).
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// REST API path prefix (with --host).
    #[arg(long, default_value = "/")]
    endpoint: String,

    /// Graylog username.
    #[arg(short, long)]
    username: Option<String>,

    /// Graylog password.
    #[arg(short, long, env = "BONFIRE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// HTTP proxy for REST requests.
    #[arg(long)]
    proxy: Option<String>,

    /// Start of the search range: a date or an expression like "2 hours ago".
    #[arg(short = '@', long)]
    search_from: Option<String>,

    /// End of the search range.
    #[arg(short = '#', long)]
    search_to: Option<String>,

    /// Print matching messages (the default).
    #[arg(short, long)]
    tail: bool,

    /// Dump matching messages as CSV.
    #[arg(short, long)]
    dump: bool,

    /// List the distinct values of the first --field.
    #[arg(short = 'l', long)]
    value_list: bool,

    /// Keep polling for new messages.
    #[arg(short, long)]
    follow: bool,

    /// Poll interval in milliseconds when following.
    #[arg(short, long, default_value_t = DEFAULT_INTERVAL_MS)]
    interval: u64,

    /// Number of messages to fetch; zero or negative means unlimited.
    #[arg(short = 'n', long, default_value_t = bonfire_core::request::DEFAULT_LIMIT, allow_negative_numbers = true)]
    limit: i64,

    /// Seconds to stay behind "now" when following.
    #[arg(short = 'a', long, default_value_t = DEFAULT_LATENCY_SECS)]
    latency: u64,

    /// Stream id or title to search in.
    #[arg(short = 'r', long)]
    stream: Option<String>,

    /// Fields to show, in order (repeat or separate by commas).
    #[arg(short = 'e', long = "field", value_delimiter = ',', default_values = DEFAULT_FIELDS)]
    fields: Vec<String>,

    /// Template variable for stored queries, as key=value.
    #[arg(short = 'x', long = "template-option")]
    template_options: Vec<String>,

    /// Field to sort by.
    #[arg(short, long)]
    sort: Option<String>,

    /// Sort ascending.
    #[arg(long, overrides_with = "desc")]
    asc: bool,

    /// Sort descending (the default).
    #[arg(long, overrides_with = "asc")]
    desc: bool,

    /// Query text; combined with the trailing arguments.
    #[arg(short, long)]
    query: Option<String>,

    /// Configuration file to read instead of the default locations.
    #[arg(long)]
    config: Option<PathBuf>,

    /// More output on stderr (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Query terms, or `:name` for a stored query.
    terms: Vec<String>,
}

impl Cli {
    fn mode(&self) -> Mode {
        match (self.tail, self.dump, self.value_list) {
            (_, _, true) => Mode::ValueList,
            (_, true, _) => Mode::Dump,
            _ => Mode::Tail,
        }
    }

    /// `--query` split on whitespace, followed by the positional terms.
    fn query_tokens(&self) -> Vec<String> {
        self.query
            .iter()
            .flat_map(|q| q.split_whitespace())
            .map(str::to_string)
            .chain(self.terms.iter().cloned())
            .collect()
    }

    fn query_options(&self) -> QueryOptions {
        QueryOptions {
            limit: self.limit,
            from: self.search_from.clone(),
            to: self.search_to.clone(),
            sort: self.sort.clone(),
            ascending: self.asc && !self.desc,
            fields: self.fields.clone(),
            stream: self.stream.clone(),
        }
    }

    fn node_args(&self) -> NodeArgs {
        NodeArgs {
            node: self.node.clone(),
            host: self.host.clone(),
            port: self.port,
            tls: self.tls,
            endpoint: self.endpoint.clone(),
            proxy: self.proxy.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval_ms: self.interval,
            latency_secs: self.latency,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(anyhow::Error::from)
        .and_then(|rt| rt.block_on(run(cli)));

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let node = config::resolve_node(&config, &cli.node_args())?;
    let backend = GraylogBackend::new(&node)?;
    let clock = SystemClock;

    let mode = cli.mode();
    let vars = TemplateVars::parse(&cli.template_options)?;
    let loaded = NamedQueryLoader::new(&config.queries).load(
        &cli.query_tokens(),
        mode,
        &vars,
        cli.query_options(),
        clock.now(),
    )?;
    let mut prepared = prepare(loaded, mode, cli.follow, clock.now())?;

    let stream = bonfire_core::stream::resolve(
        &backend,
        &node.username,
        prepared.stream.as_deref(),
        &mut TerminalPrompter,
    )
    .await?;
    if let Some(id) = stream {
        prepared.model.scope_to_stream(&id);
    }

    let mut sink: Box<dyn OutputSink> = match mode {
        Mode::Dump => Box::new(DumpFormatter::new(io::stdout().lock())),
        Mode::Tail | Mode::ValueList => Box::new(TailFormatter::new(io::stdout().lock())),
    };

    match prepared.model {
        QueryModel::Search(query) if prepared.follow => {
            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::debug!("interrupt received");
                    cancel_tx.send_replace(true);
                }
            });

            let engine = TailEngine::new(query, cli.poll_settings(), clock);
            let summary = engine.run(&backend, sink.as_mut(), cancel_rx).await?;
            tracing::info!(
                polls = summary.polls,
                records = summary.records,
                "follow stopped"
            );
        }
        model => {
            let count = run_once(&backend, &model, sink.as_mut(), clock.now()).await?;
            tracing::info!(count, "query complete");
        }
    }
    Ok(())
}
