//! Feedback CLI - the feedback log from a terminal
//!
//!   feedback status              → Connect the node's wallet, output session state
//!   feedback list                → Whole history, output JSON array
//!   feedback count               → Number of entries on chain
//!   feedback send <message>      → Submit and wait for confirmation
//!   feedback watch               → Print entries as they arrive (Ctrl+C to stop)
//!
//! Configuration (flags override environment, `.env` is loaded if present):
//!   --url <ws-url>               FEEDBACK_NETWORK_URL
//!   --contract <address>         FEEDBACK_CONTRACT_ADDRESS
//!   --timeout <secs>             FEEDBACK_CONFIRM_TIMEOUT_SECS
//!
//! Output format:
//!   --json       Output raw JSON (default for non-tty)
//!   --pretty     Pretty-print JSON (default for tty)
//!   --log-json   JSON log lines on stderr (or FEEDBACK_LOG_JSON=1)

use anyhow::{anyhow, bail, Context};
use feedback_client::client::load_dotenv;
use feedback_client::core::methods::env as keys;
use feedback_client::core::Entry;
use feedback_client::logging::{init_logging, LogFormat};
use feedback_client::{install_signal_handlers, ClientConfig, ClientError, FeedbackClient};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::env;
use std::io::IsTerminal;
use tokio::task::LocalSet;
use tracing::{debug, info};

fn main() {
    let _ = rustls::crypto::ring::default_provider().install_default();
    load_dotenv(".env");

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);
    init_logging(if opts.log_json { LogFormat::Json } else { LogFormat::from_env() });

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("feedback {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let Some(command) = opts.command.clone() else {
        print_usage();
        return;
    };

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")
        .and_then(|rt| LocalSet::new().block_on(&rt, dispatch(&command, &opts)));

    match result {
        Ok(output) => println!("{}", opts.format(&output)),
        Err(e) => {
            let kind = e.downcast_ref::<ClientError>().map(ClientError::kind).unwrap_or("cli");
            eprintln!("{}", opts.format(&json!({"error": e.to_string(), "kind": kind})));
            std::process::exit(1);
        }
    }
}

async fn dispatch(command: &str, opts: &ParsedArgs) -> anyhow::Result<Value> {
    match command {
        "status" => cmd_status(opts).await,
        "list" | "ls" => cmd_list(opts).await,
        "count" => cmd_count(opts).await,
        "send" => cmd_send(opts).await,
        "watch" => cmd_watch(opts).await,
        other => bail!("Unknown command: {}", other),
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    message: Option<String>,
    url: Option<String>,
    contract: Option<String>,
    timeout: Option<String>,
    json: bool,
    pretty: bool,
    log_json: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--log-json" => opts.log_json = true,
                "--url" | "-u" => {
                    if i + 1 < args.len() {
                        opts.url = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--contract" | "-c" => {
                    if i + 1 < args.len() {
                        opts.contract = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--timeout" | "-t" => {
                    if i + 1 < args.len() {
                        opts.timeout = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                _ => positional.push(arg.clone()),
            }
            i += 1;
        }

        let mut positional = positional.into_iter();
        opts.command = positional.next();
        let rest: Vec<String> = positional.collect();
        if !rest.is_empty() {
            opts.message = Some(rest.join(" "));
        }
        opts
    }

    /// Flags first, then the environment.
    fn config(&self) -> anyhow::Result<ClientConfig> {
        let config = ClientConfig::from_lookup(|key| {
            let flag = match key {
                k if k == keys::NETWORK_URL => self.url.clone(),
                k if k == keys::CONTRACT_ADDRESS => self.contract.clone(),
                k if k == keys::CONFIRM_TIMEOUT_SECS => self.timeout.clone(),
                _ => None,
            };
            flag.or_else(|| env::var(key).ok())
        })?;
        Ok(config)
    }

    fn format(&self, value: &Value) -> String {
        let pretty = self.pretty || (!self.json && std::io::stdout().is_terminal());
        let formatted = if pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        formatted.unwrap_or_else(|_| value.to_string())
    }
}

fn print_usage() {
    println!(
        r#"feedback - on-chain feedback log client

USAGE:
    feedback <command> [options]

COMMANDS:
    status              Connect the node's wallet and show the session
    list                Show every feedback entry
    count               Show the number of entries on chain
    send <message>      Submit feedback and wait for confirmation
    watch               Stream new entries until interrupted

OPTIONS:
    -u, --url <url>          WebSocket JSON-RPC endpoint ({url})
    -c, --contract <addr>    Feedback contract address ({contract})
    -t, --timeout <secs>     Confirmation timeout ({timeout})
    --json                   Compact JSON output
    --pretty                 Pretty JSON output
    --log-json               JSON log lines on stderr
    -h, --help               Show this help
    -V, --version            Show version

Logging: RUST_LOG filters, {log_json}=1 for JSON lines on stderr."#,
        url = keys::NETWORK_URL,
        contract = keys::CONTRACT_ADDRESS,
        timeout = keys::CONFIRM_TIMEOUT_SECS,
        log_json = keys::LOG_JSON,
    );
}

async fn open(opts: &ParsedArgs) -> anyhow::Result<FeedbackClient> {
    let config = opts.config()?;
    debug!("connecting to {}", config.require_network_url()?);
    Ok(FeedbackClient::connect_ws(config).await?)
}

fn entries_json(entries: &[Entry]) -> Value {
    serde_json::to_value(entries).unwrap_or(Value::Null)
}

async fn cmd_status(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let client = open(opts).await?;
    let binding = client.session().connect().await?;
    Ok(json!({
        "session": client.session().state(),
        "epoch": binding.epoch,
        "contract": client.config().contract_address,
    }))
}

async fn cmd_list(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let client = open(opts).await?;
    let entries = client.gateway().fetch_all().await?;
    Ok(entries_json(&entries))
}

async fn cmd_count(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let client = open(opts).await?;
    Ok(json!({"count": client.gateway().count().await?}))
}

async fn cmd_send(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let message = opts
        .message
        .clone()
        .ok_or_else(|| anyhow!("Usage: feedback send <message>"))?;
    let client = open(opts).await?;
    client.session().connect().await?;

    let submissions = client.submissions();
    submissions.compose(message)?;
    let tx = submissions.send().await?;
    info!("feedback confirmed in {}", tx);
    Ok(json!({"tx": tx, "submission": submissions.state()}))
}

async fn cmd_watch(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let client = open(opts).await?;
    client.connect().await?;

    let shutdown = install_signal_handlers();
    let mut snapshots = client.store().watch();
    let mut printed: HashSet<Entry> = HashSet::new();
    print_new(opts, &client.store().all(), &mut printed);

    let events = client.run();
    tokio::pin!(events);
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            result = &mut events => {
                result?;
                break;
            }
            snapshot = snapshots.next() => match snapshot {
                Some(entries) => print_new(opts, &entries, &mut printed),
                None => break,
            },
        }
    }
    client.teardown();
    Ok(json!({"printed": printed.len(), "interrupted": shutdown.is_triggered()}))
}

/// One line per entry not printed yet. Re-hydrations repeat entries already shown.
fn print_new(opts: &ParsedArgs, entries: &[Entry], printed: &mut HashSet<Entry>) {
    for entry in entries {
        if printed.insert(entry.clone()) {
            println!("{}", opts.format(&json!(entry)));
        }
    }
}
