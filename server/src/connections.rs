use axum::extract::ws::Message;
use raspa_execution::Notifier;
use raspa_types::api::Notification;
use raspa_types::casino::{AccountId, BalanceSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::metrics::WsMetrics;

pub type OutboundSender = mpsc::Sender<Message>;
pub type OutboundReceiver = mpsc::Receiver<Message>;

pub fn outbound_channel(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(capacity.max(1))
}

struct Registration {
    connection: u64,
    sender: OutboundSender,
}

/// Authenticated WebSocket connections, at most one per account.
///
/// Pushes are fire-and-forget: a full or closed outbound queue drops the message and bumps
/// `notifications_dropped`. Nothing here ever fails the operation that produced the update.
pub struct Connections {
    next_connection: AtomicU64,
    registered: Mutex<HashMap<AccountId, Registration>>,
    metrics: Arc<WsMetrics>,
}

impl Connections {
    pub fn new(metrics: Arc<WsMetrics>) -> Self {
        Self {
            next_connection: AtomicU64::new(1),
            registered: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    fn registered(&self) -> MutexGuard<'_, HashMap<AccountId, Registration>> {
        match self.registered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("connection registry lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Bind `sender` to `account`, replacing any older connection. Returns the connection id
    /// to pass back to [`Connections::unregister`].
    pub fn register(&self, account: AccountId, sender: OutboundSender) -> u64 {
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .registered()
            .insert(account, Registration { connection, sender });
        if let Some(previous) = previous {
            self.metrics.inc_replaced();
            tracing::info!(
                account_id = %account,
                replaced = previous.connection,
                connection,
                "ws connection replaced"
            );
        }
        connection
    }

    /// Remove `account`'s registration only if it still belongs to `connection`.
    pub fn unregister(&self, account: AccountId, connection: u64) -> bool {
        let mut registered = self.registered();
        match registered.get(&account) {
            Some(current) if current.connection == connection => {
                registered.remove(&account);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.registered().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue `notification` for `account`'s connection, if any. Returns whether it was queued.
    pub fn push(&self, account: AccountId, notification: &Notification) -> bool {
        let Some(sender) = self
            .registered()
            .get(&account)
            .map(|registration| registration.sender.clone())
        else {
            tracing::debug!(account_id = %account, "no ws connection for notification");
            return false;
        };
        let text = match serde_json::to_string(notification) {
            Ok(text) => text,
            Err(err) => {
                self.metrics.inc_notification_dropped();
                tracing::warn!(account_id = %account, %err, "failed to encode notification");
                return false;
            }
        };
        match sender.try_send(Message::Text(text)) {
            Ok(()) => {
                self.metrics.inc_notification_sent();
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.inc_queue_full();
                self.metrics.inc_notification_dropped();
                tracing::warn!(account_id = %account, "ws outbound queue full; notification dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.inc_notification_dropped();
                tracing::warn!(account_id = %account, "ws connection closed; notification dropped");
                false
            }
        }
    }
}

impl Notifier for Connections {
    fn notify(&self, account: AccountId, balances: BalanceSnapshot) {
        self.push(account, &Notification::Balance(balances));
    }
}
