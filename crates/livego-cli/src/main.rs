//! LiveGo CLI
//!
//! Thin wrapper around livego-core for poking at a LiveGo server from the
//! terminal.
//!
//! ## Usage
//!
//! ```bash
//! # Mount a component and print its initial state
//! livego --origin http://localhost:8080 mount counter --props '{"count": 1}'
//!
//! # Mount, then send one batch: sync a field and call a method
//! livego mount counter --set step=5 --call increment='[1]' --call validate
//!
//! # Tail a component's push channel
//! livego stream counter-1 <signature> --event chat --event presence
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use livego_core::{
    ChannelHooks, ChannelState, ClientConfig, HttpPushSource, HttpTransport, Intent, LiveClient,
    MountOptions, Props, StreamChannel, StreamEvent, StreamTarget,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// LiveGo - client for server-rendered live components
#[derive(Parser)]
#[command(name = "livego")]
#[command(version)]
#[command(about = "LiveGo - client for server-rendered live components")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Server origin
    #[arg(long, global = true, default_value = "http://localhost:8080")]
    origin: String,

    /// Base path for mount/update requests
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Extra request header (NAME:VALUE), may be repeated
    #[arg(short = 'H', long = "header", global = true, value_name = "NAME:VALUE")]
    headers: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a component, optionally run one batch of intents, print the result
    Mount {
        /// Component name
        component: String,

        /// Mount props as a JSON object
        #[arg(long, default_value = "{}")]
        props: String,

        /// Call a method (METHOD or METHOD=JSON_ARRAY), may be repeated
        #[arg(long = "call", value_name = "METHOD[=PARAMS]")]
        calls: Vec<String>,

        /// Sync a field (FIELD=JSON), may be repeated
        #[arg(long = "set", value_name = "FIELD=VALUE")]
        sets: Vec<String>,
    },

    /// Tail a component's push channel
    Stream {
        /// Component instance id
        component_id: String,

        /// Channel signature issued by the server
        signature: String,

        /// Only print these event types, may be repeated
        #[arg(long = "event", value_name = "TYPE")]
        events: Vec<String>,

        /// Reconnect attempts before giving up
        #[arg(long)]
        max_attempts: Option<u32>,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Parse a `NAME:VALUE` header argument
fn parse_header(s: &str) -> Result<(String, String)> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid header '{}': expected NAME:VALUE", s))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Invalid header '{}': empty name", s);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parse mount props; must be a JSON object
fn parse_props(s: &str) -> Result<Props> {
    match serde_json::from_str::<Value>(s).with_context(|| format!("Invalid --props JSON: {s}"))? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--props must be a JSON object, got {}", other),
    }
}

/// Parse `METHOD` or `METHOD=[params...]`
fn parse_call(s: &str) -> Result<Intent> {
    let (method, params) = match s.split_once('=') {
        Some((method, raw)) => {
            let params = match serde_json::from_str::<Value>(raw)
                .with_context(|| format!("Invalid params for --call {method}: {raw}"))?
            {
                Value::Array(params) => params,
                other => anyhow::bail!("--call params must be a JSON array, got {}", other),
            };
            (method, params)
        }
        None => (s, Vec::new()),
    };
    if method.is_empty() {
        anyhow::bail!("Invalid --call '{}': empty method name", s);
    }
    Ok(Intent::call(method, params))
}

/// Parse `FIELD=VALUE`; a value that is not valid JSON is sent as a string
fn parse_set(s: &str) -> Result<Intent> {
    let (field, raw) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Invalid --set '{}': expected FIELD=VALUE", s))?;
    if field.is_empty() {
        anyhow::bail!("Invalid --set '{}': empty field name", s);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok(Intent::set(field, value))
}

fn build_config(endpoint: Option<String>, headers: &[String]) -> Result<ClientConfig> {
    let mut config = ClientConfig::default();
    if let Some(endpoint) = endpoint {
        config = config.with_endpoint(endpoint);
    }
    for header in headers {
        let (name, value) = parse_header(header)?;
        config = config.with_header(name, value);
    }
    Ok(config)
}

/// Pair each repeated flag value with its position on the command line
fn with_positions(values: Vec<String>, matches: Option<&ArgMatches>, id: &str) -> Vec<(usize, String)> {
    let positions: Vec<usize> = matches
        .and_then(|m| m.indices_of(id))
        .map(|indices| indices.collect())
        .unwrap_or_default();
    values
        .into_iter()
        .enumerate()
        .map(|(n, value)| (positions.get(n).copied().unwrap_or(usize::MAX), value))
        .collect()
}

/// Build one batch from `--set` and `--call` flags in the order they were typed
fn ordered_intents(sets: &[(usize, String)], calls: &[(usize, String)]) -> Result<Vec<Intent>> {
    let mut intents = Vec::with_capacity(sets.len() + calls.len());
    for (position, set) in sets {
        intents.push((*position, parse_set(set)?));
    }
    for (position, call) in calls {
        intents.push((*position, parse_call(call)?));
    }
    intents.sort_by_key(|(position, _)| *position);
    Ok(intents.into_iter().map(|(_, intent)| intent).collect())
}

fn event_line(event: &StreamEvent) -> Value {
    json!({
        "event": event.event_type,
        "data": event.data,
        "id": event.id,
    })
}

async fn run_mount(
    transport: HttpTransport,
    component: String,
    props: &str,
    sets: &[(usize, String)],
    calls: &[(usize, String)],
) -> Result<()> {
    let props = parse_props(props)?;
    let intents = ordered_intents(sets, calls)?;

    let client = LiveClient::new(transport);
    let instance = client
        .mount(component.as_str(), props, MountOptions::default())
        .await
        .with_context(|| format!("Failed to mount '{}'", component))?;

    info!(component = %component, intents = intents.len(), "Sending batch");
    let effects = instance
        .batch(intents)
        .await
        .with_context(|| format!("Update failed for '{}'", component))?;

    let output = json!({
        "id": instance.id(),
        "checksum": instance.checksum(),
        "state": instance.state(),
        "effects": effects,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_stream(
    transport: HttpTransport,
    mut config: ClientConfig,
    target: StreamTarget,
    events: Vec<String>,
    max_attempts: Option<u32>,
) -> Result<()> {
    if let Some(max_attempts) = max_attempts {
        config.stream.max_attempts = max_attempts;
    }

    let hooks = ChannelHooks::new()
        .on_connect(|| eprintln!("connected"))
        .on_error(|e| eprintln!("stream error: {}", e));
    let source = HttpPushSource::new(&transport, config.clone());
    let channel = StreamChannel::from_config(source, target, &config.stream, hooks);

    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    if events.is_empty() {
        channel.on_any(move |event| {
            let _ = tx.send(event_line(event));
        });
    } else {
        for event_type in events {
            let tx = tx.clone();
            let name = event_type.clone();
            channel.on(event_type, move |data| {
                let _ = tx.send(json!({"event": name, "data": data}));
            });
        }
    }

    debug!(stream = %channel.target(), "Tailing push channel");
    channel.connect();
    let mut poll = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                channel.disconnect();
                return Ok(());
            }
            Some(line) = rx.recv() => {
                println!("{}", line);
            }
            _ = poll.tick() => {
                if channel.state() == ChannelState::Disconnected {
                    while let Ok(line) = rx.try_recv() {
                        println!("{}", line);
                    }
                    anyhow::bail!(
                        "Push channel gave up after {} reconnect attempts",
                        channel.attempts()
                    );
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    setup_logging(cli.verbose);
    debug!(origin = %cli.origin, "Using server origin");

    let config = build_config(cli.endpoint, &cli.headers)?;
    ClientConfig::install_default(config.clone())
        .map_err(|_| anyhow::anyhow!("Default configuration already installed"))?;
    let transport = HttpTransport::new(&cli.origin)?;

    match cli.command {
        Commands::Mount {
            component,
            props,
            calls,
            sets,
        } => {
            let mount_matches = matches.subcommand_matches("mount");
            let sets = with_positions(sets, mount_matches, "sets");
            let calls = with_positions(calls, mount_matches, "calls");
            run_mount(transport, component, &props, &sets, &calls).await
        }

        Commands::Stream {
            component_id,
            signature,
            events,
            max_attempts,
        } => {
            let target = StreamTarget::new(component_id, signature);
            run_stream(transport, config, target, events, max_attempts).await
        }
    }
}
