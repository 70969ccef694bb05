use anyhow::{Context, Result};
use clap::Parser;
use raspa_server::{Api, Server, ServerConfig};
use raspa_types::casino::Money;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn init_tracing(level: tracing::Level) {
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Path to the SQLite database (state is kept in memory when omitted).
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// Milliseconds an operation waits for an account lock before answering busy.
    #[arg(long)]
    lock_timeout_ms: Option<u64>,

    /// Real balance granted to new accounts, e.g. "10.00".
    #[arg(long)]
    starting_balance: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Per-IP HTTP requests per second (0 disables rate limiting).
    #[arg(long)]
    http_rate_limit_per_second: Option<u64>,

    #[arg(long)]
    http_rate_limit_burst: Option<u32>,

    /// Maximum HTTP body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,

    /// Outbound WebSocket queue depth per connection.
    #[arg(long)]
    ws_outbound_buffer: Option<usize>,

    /// Shared secret expected in `x-webhook-secret` on deposit webhooks.
    #[arg(long)]
    webhook_secret: Option<String>,

    /// Bearer token for `POST /affiliates` (affiliate routes are disabled when unset).
    #[arg(long)]
    admin_token: Option<String>,
}

/// Maps an optional arg value to an optional limit: 0 => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn parse_env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

fn parse_env_string(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_log_level(raw: &str) -> Result<tracing::Level> {
    raw.parse()
        .map_err(|err| anyhow::anyhow!("invalid log level {raw:?}: {err}"))
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let defaults = ServerConfig::default();

    let lock_timeout = match args.lock_timeout_ms.or_else(|| parse_env_u64("LOCK_TIMEOUT_MS")) {
        Some(0) => anyhow::bail!("lock_timeout_ms must be > 0"),
        Some(ms) => Duration::from_millis(ms),
        None => defaults.lock_timeout,
    };
    let starting_balance = match &args.starting_balance {
        Some(raw) => raw
            .parse::<Money>()
            .with_context(|| format!("invalid starting balance {raw:?}"))?,
        None => defaults.starting_balance,
    };
    let ws_outbound_buffer = match args.ws_outbound_buffer {
        Some(0) => anyhow::bail!("ws_outbound_buffer must be > 0"),
        Some(buffer) => buffer,
        None => defaults.ws_outbound_buffer,
    };

    Ok(ServerConfig {
        database_path: args
            .database_path
            .clone()
            .or_else(|| parse_env_string("DATABASE_PATH").map(PathBuf::from)),
        lock_timeout,
        starting_balance,
        http_rate_limit_per_second: map_optional_limit(
            args.http_rate_limit_per_second,
            defaults.http_rate_limit_per_second,
        ),
        http_rate_limit_burst: map_optional_limit(
            args.http_rate_limit_burst,
            defaults.http_rate_limit_burst,
        ),
        http_body_limit_bytes: map_optional_limit(
            args.http_body_limit_bytes,
            defaults.http_body_limit_bytes,
        ),
        ws_outbound_buffer,
        ws_auth_timeout: defaults.ws_auth_timeout,
        webhook_secret: args
            .webhook_secret
            .clone()
            .or_else(|| parse_env_string("DEPOSIT_WEBHOOK_SECRET")),
        admin_token: args
            .admin_token
            .clone()
            .or_else(|| parse_env_string("ADMIN_AUTH_TOKEN")),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(parse_log_level(&args.log_level)?);

    let config = build_config(&args)?;
    match &config.database_path {
        Some(path) => info!(path = %path.display(), "using sqlite store"),
        None => info!("using in-memory store; state is lost on exit"),
    }
    if config.webhook_secret.is_none() {
        tracing::warn!("no deposit webhook secret configured; webhooks are unauthenticated");
    }
    let server = Server::open(config).context("failed to open account store")?;
    let app = Api::new(Arc::new(server)).router();

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}
