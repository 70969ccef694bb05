use raspa_execution::{run_blocking, Store, StoreError};
use raspa_types::casino::AccountId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Bearer-token to account map.
///
/// Tokens are opaque uuid v4 strings persisted in the account store, so they stay valid across
/// restarts and across instances sharing a database. Resolved tokens are cached in process.
pub struct Sessions {
    store: Arc<dyn Store>,
    cache: RwLock<HashMap<String, AccountId>>,
}

impl Sessions {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, AccountId>> {
        match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("session cache lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, AccountId>> {
        match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("session cache lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Issue and persist a fresh token bound to `account`.
    pub async fn issue(&self, account: AccountId) -> Result<String, StoreError> {
        let token = Uuid::new_v4().to_string();
        let store = self.store.clone();
        let persisted = token.clone();
        run_blocking(move || store.create_session(&persisted, account, now_ms())).await?;
        self.write().insert(token.clone(), account);
        Ok(token)
    }

    pub async fn resolve(&self, token: &str) -> Result<Option<AccountId>, StoreError> {
        let cached = self.read().get(token).copied();
        if cached.is_some() {
            return Ok(cached);
        }
        let store = self.store.clone();
        let lookup = token.to_string();
        let account = run_blocking(move || store.resolve_session(&lookup)).await?;
        if let Some(account) = account {
            self.write().insert(token.to_string(), account);
        }
        Ok(account)
    }

    /// Tokens this process has issued or resolved since start.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
