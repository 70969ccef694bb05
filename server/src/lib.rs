//! HTTP and WebSocket transport for the raspa backend.
//!
//! [`Server`] owns the shared state handed to every axum handler: the game [`Casino`], the
//! store-backed bearer-session registry, the WebSocket connection registry (which doubles as the casino's
//! post-commit [`Notifier`](raspa_execution::Notifier)) and the metrics counters. [`Api`] builds
//! the router on top of it.

use raspa_execution::{Casino, CasinoConfig, FunnelConfig, Memory, SqliteStore, Store, StoreError};
use raspa_types::casino::Money;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod api;
mod connections;
pub mod metrics;
mod sessions;

pub use api::Api;
pub use connections::{outbound_channel, Connections, OutboundReceiver, OutboundSender};
pub use sessions::Sessions;

use metrics::{GameMetrics, HttpMetrics, WsMetrics};

pub const DEFAULT_WS_OUTBOUND_BUFFER: usize = 64;
pub const DEFAULT_WS_AUTH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 16 * 1024;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// SQLite database file. `None` keeps all state in memory.
    pub database_path: Option<PathBuf>,
    pub lock_timeout: Duration,
    pub starting_balance: Money,
    pub http_rate_limit_per_second: Option<u64>,
    pub http_rate_limit_burst: Option<u32>,
    pub http_body_limit_bytes: Option<usize>,
    pub ws_outbound_buffer: usize,
    /// How long a fresh WebSocket may stay silent before its `auth` message.
    pub ws_auth_timeout: Duration,
    /// Expected `x-webhook-secret` on deposit webhooks. `None` accepts unsigned calls.
    pub webhook_secret: Option<String>,
    /// Bearer token for affiliate administration. `None` disables those routes.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            lock_timeout: raspa_execution::DEFAULT_LOCK_TIMEOUT,
            starting_balance: Money::ZERO,
            http_rate_limit_per_second: None,
            http_rate_limit_burst: None,
            http_body_limit_bytes: Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
            ws_outbound_buffer: DEFAULT_WS_OUTBOUND_BUFFER,
            ws_auth_timeout: DEFAULT_WS_AUTH_TIMEOUT,
            webhook_secret: None,
            admin_token: None,
        }
    }
}

impl ServerConfig {
    pub fn casino_config(&self) -> CasinoConfig {
        CasinoConfig {
            funnel: FunnelConfig::default(),
            lock_timeout: self.lock_timeout,
            starting_balance: self.starting_balance,
        }
    }

    /// Open the configured store: SQLite when a path is set, otherwise in-memory.
    pub fn open_store(&self) -> Result<Arc<dyn Store>, StoreError> {
        match &self.database_path {
            Some(path) => Ok(Arc::new(SqliteStore::open(path)?)),
            None => Ok(Arc::new(Memory::new())),
        }
    }
}

pub struct Server {
    pub config: ServerConfig,
    casino: Casino<Arc<dyn Store>>,
    sessions: Sessions,
    connections: Arc<Connections>,
    game_metrics: GameMetrics,
    http_metrics: HttpMetrics,
    ws_metrics: Arc<WsMetrics>,
}

impl Server {
    pub fn new(config: ServerConfig, store: Arc<dyn Store>) -> Self {
        let ws_metrics = Arc::new(WsMetrics::default());
        let connections = Arc::new(Connections::new(ws_metrics.clone()));
        let casino =
            Casino::with_notifier(store.clone(), config.casino_config(), connections.clone());
        Self {
            config,
            casino,
            sessions: Sessions::new(store),
            connections,
            game_metrics: GameMetrics::default(),
            http_metrics: HttpMetrics::default(),
            ws_metrics,
        }
    }

    /// Build a server over the store named by `config`.
    pub fn open(config: ServerConfig) -> Result<Self, StoreError> {
        let store = config.open_store()?;
        Ok(Self::new(config, store))
    }

    pub fn casino(&self) -> &Casino<Arc<dyn Store>> {
        &self.casino
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    pub fn game_metrics(&self) -> &GameMetrics {
        &self.game_metrics
    }

    pub fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }

    pub fn ws_metrics(&self) -> &WsMetrics {
        &self.ws_metrics
    }
}
