//! minechat: resilient client for line-oriented chat servers
//!
//! Keeps two TCP connections to the server (one streams the chat, one
//! accepts the token and outgoing messages), replays and appends a local
//! history file, and reconnects with exponential backoff when either
//! connection dies or goes quiet.
//!
//! Usage:
//!   minechat --token <TOKEN>
//!   minechat --nickname "Brave Cat"     (register a new account first)

mod auth;
mod console;
mod error;
mod history;
mod messages;
mod protocol;
mod queue;
mod session;
mod supervisor;
mod transport;
mod watchdog;

use anyhow::{bail, Context, Result};
use clap::Parser;
use error::ChatError;
use history::HistoryWriter;
use protocol::{Config, Endpoint, RetryPolicy};
use session::Session;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Resilient client for line-oriented chat servers
#[derive(Parser, Debug)]
#[command(name = "minechat")]
#[command(about = "Resilient client for line-oriented chat servers")]
#[command(version)]
struct Args {
    /// Chat server host
    #[arg(long, env = "MINECHAT_HOST", default_value = "minechat.dvmn.org")]
    host: String,

    /// Port that streams chat messages
    #[arg(long, env = "MINECHAT_LISTEN_PORT", default_value = "5000")]
    listen_port: u16,

    /// Port that accepts the token and outgoing messages
    #[arg(long, env = "MINECHAT_WRITE_PORT", default_value = "5050")]
    write_port: u16,

    /// Account token
    #[arg(long, env = "MINECHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Register a new account with this nickname when no token is given
    #[arg(long)]
    nickname: Option<String>,

    /// File the chat transcript is appended to
    #[arg(long, env = "MINECHAT_HISTORY", default_value = "minechat.history")]
    history: PathBuf,

    /// Delay before the first reconnect in milliseconds
    #[arg(long, default_value = "1000")]
    retry_delay_ms: u64,

    /// Reconnect attempts before giving up
    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Multiplier applied to the reconnect delay after each attempt
    #[arg(long, default_value = "1.4")]
    backoff_factor: f64,

    /// Seconds a connection must stay up before the retry budget is restored
    #[arg(long, default_value = "30")]
    healthy_after_secs: u64,

    /// Milliseconds without activity before the connection is considered dead
    #[arg(long, default_value = "3000")]
    watchdog_timeout_ms: u64,

    /// Milliseconds between keepalive pings on the sending connection
    #[arg(long, default_value = "1000")]
    ping_interval_ms: u64,

    /// Write the token again at the start of the outbound stream
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    resend_token: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> Result<Config> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            bail!("--backoff-factor must be a number >= 1, got {}", self.backoff_factor);
        }
        if self.ping_interval_ms >= self.watchdog_timeout_ms {
            warn!(
                "Ping interval ({}ms) is not shorter than the watchdog timeout ({}ms); quiet chats will reconnect",
                self.ping_interval_ms,
                self.watchdog_timeout_ms
            );
        }

        Ok(Config {
            endpoint: Endpoint {
                host: self.host.clone(),
                send_port: self.write_port,
                receive_port: self.listen_port,
            },
            retry: RetryPolicy {
                initial_delay: Duration::from_millis(self.retry_delay_ms),
                max_retries: self.max_retries,
                backoff_factor: self.backoff_factor,
                healthy_after: (self.healthy_after_secs > 0)
                    .then(|| Duration::from_secs(self.healthy_after_secs)),
            },
            watchdog_timeout: Duration::from_millis(self.watchdog_timeout_ms),
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            resend_token: self.resend_token,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env may carry MINECHAT_TOKEN; it must be loaded before clap reads env
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    info!("minechat v{}", env!("CARGO_PKG_VERSION"));
    match dotenv {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }

    let config = args.config()?;
    info!(
        "Server: {} (listen {}, write {})",
        config.endpoint.host, config.endpoint.receive_port, config.endpoint.send_port
    );

    let token = match (&args.token, &args.nickname) {
        (Some(token), _) => token.clone(),
        (None, Some(nickname)) => register_account(&config.endpoint, nickname).await?,
        (None, None) => bail!("No token: pass --token, set MINECHAT_TOKEN, or register with --nickname"),
    };

    let (core, ui) = queue::queues();

    history::load(&args.history, &core.messages)
        .await
        .with_context(|| format!("Failed to read history file {:?}", args.history))?;
    let history_writer = HistoryWriter::open(&args.history)
        .await
        .with_context(|| format!("Failed to open history file {:?}", args.history))?;

    let history_handle = tokio::spawn(history_writer.run(ui.history));
    let display_handle = tokio::spawn(console::print_messages(ui.messages));
    let status_handle = tokio::spawn(console::report_status(ui.status));
    console::spawn_stdin_reader(ui.outbound);

    let session = Session::new(config, token, core);
    let outcome = tokio::select! {
        outcome = session.run() => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };

    // Closing the core's queues lets the collaborators drain and finish
    drop(session);
    let _ = tokio::join!(history_handle, display_handle, status_handle);

    let Some(outcome) = outcome else {
        info!("Interrupted, goodbye!");
        return Ok(());
    };

    match outcome {
        Err(ChatError::InvalidToken) => {
            error!("The server did not recognise the token. Check it or register a new account");
            Err(ChatError::InvalidToken.into())
        }
        Err(err) => {
            error!("Fatal: {}", err);
            Err(err.into())
        }
        Ok(never) => match never {},
    }
}

/// Register `nickname` on the sending port and return the new token
async fn register_account(endpoint: &Endpoint, nickname: &str) -> Result<String> {
    let nickname = auth::normalize_nickname(nickname)?;
    info!("Registering new account {:?}", nickname);
    let (mut reader, mut writer) = transport::open(&endpoint.host, endpoint.send_port).await?;
    let account = auth::register(&mut reader, &mut writer, &nickname).await;
    writer.shutdown().await;

    let account = account.context("Registration failed")?;
    info!(
        "Welcome, {}! Save your token to skip registration next time: MINECHAT_TOKEN={}",
        account.nickname, account.account_hash
    );
    Ok(account.account_hash)
}
