use raspa_types::casino::{
    Account, AccountBalances, AccountId, Affiliate, AffiliateId, DepositHistory, LedgerEntry,
    LedgerKind, Money, PlayCounters, RolloverProgress, Tier,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::state::{Store, StoreError};

const ACCOUNT_COLUMNS: &str = "id, tier, real_cents, vault_cents, withdrawable_cents, \
     loss_streak, total_plays, total_wagered_cents, deposit_rollover_cents, \
     bonus_rollover_cents, total_deposited_cents, last_deposit_cents, created_at_ms, affiliate_id";

/// SQLite-backed [`Store`]. One connection, guarded by a mutex; every commit is a transaction.
///
/// Every method blocks on file I/O. Async callers go through [`crate::state::run_blocking`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        init_schema_sqlite(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema_sqlite(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

fn init_schema_sqlite(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;
         CREATE TABLE IF NOT EXISTS accounts (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             tier TEXT NOT NULL,
             real_cents INTEGER NOT NULL CHECK (real_cents >= 0),
             vault_cents INTEGER NOT NULL CHECK (vault_cents >= 0),
             withdrawable_cents INTEGER NOT NULL CHECK (withdrawable_cents >= 0),
             loss_streak INTEGER NOT NULL,
             total_plays INTEGER NOT NULL,
             total_wagered_cents INTEGER NOT NULL,
             deposit_rollover_cents INTEGER NOT NULL,
             bonus_rollover_cents INTEGER NOT NULL,
             total_deposited_cents INTEGER NOT NULL,
             last_deposit_cents INTEGER NOT NULL,
             created_at_ms INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS ledger (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             account_id INTEGER NOT NULL REFERENCES accounts(id),
             kind TEXT NOT NULL,
             amount_cents INTEGER NOT NULL,
             description TEXT NOT NULL,
             created_at_ms INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS ledger_account_idx ON ledger(account_id);
         CREATE TABLE IF NOT EXISTS sessions (
             token TEXT PRIMARY KEY,
             account_id INTEGER NOT NULL REFERENCES accounts(id),
             created_at_ms INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS affiliates (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             name TEXT NOT NULL,
             referral_code TEXT NOT NULL UNIQUE,
             bonus_cents INTEGER NOT NULL CHECK (bonus_cents >= 0)
         );",
    )?;
    // Files created before coupons existed lack the binding column.
    if !has_column(conn, "accounts", "affiliate_id")? {
        conn.execute_batch(
            "ALTER TABLE accounts ADD COLUMN affiliate_id INTEGER REFERENCES affiliates(id);",
        )?;
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

fn money(row: &Row<'_>, idx: usize) -> rusqlite::Result<Money> {
    row.get::<_, u64>(idx).map(Money::from_cents)
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<(Account, String)> {
    let tier: String = row.get(1)?;
    let account = Account {
        id: AccountId(row.get(0)?),
        tier: Tier::Standard,
        balances: AccountBalances {
            real: money(row, 2)?,
            bonus_vault: money(row, 3)?,
            withdrawable: money(row, 4)?,
        },
        play: PlayCounters {
            loss_streak: row.get(5)?,
            total_plays: row.get(6)?,
        },
        rollover: RolloverProgress {
            total_wagered: money(row, 7)?,
            deposit: money(row, 8)?,
            bonus: money(row, 9)?,
        },
        deposits: DepositHistory {
            total_deposited: money(row, 10)?,
            last_deposit_amount: money(row, 11)?,
        },
        affiliate: row.get::<_, Option<u64>>(13)?.map(AffiliateId),
        created_at_ms: row.get(12)?,
    };
    Ok((account, tier))
}

impl Store for SqliteStore {
    fn create_account(&self, real: Money, created_at_ms: u64) -> Result<Account, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accounts (tier, real_cents, vault_cents, withdrawable_cents, \
             loss_streak, total_plays, total_wagered_cents, deposit_rollover_cents, \
             bonus_rollover_cents, total_deposited_cents, last_deposit_cents, created_at_ms) \
             VALUES (?1, ?2, 0, 0, 0, 0, 0, 0, 0, 0, 0, ?3)",
            params![Tier::Standard.as_str(), real.cents(), created_at_ms],
        )?;
        let id = u64::try_from(conn.last_insert_rowid())
            .map_err(|_| StoreError::Corrupt("negative account id".to_string()))?;
        Ok(Account::with_balance(AccountId(id), created_at_ms, real))
    }

    fn load(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
                params![id.0],
                account_from_row,
            )
            .optional()?;
        let Some((mut account, tier)) = row else {
            return Ok(None);
        };
        account.tier = Tier::parse(&tier)
            .ok_or_else(|| StoreError::Corrupt(format!("account {id} has tier {tier:?}")))?;
        Ok(Some(account))
    }

    fn commit(&self, account: &Account, ledger: &[LedgerEntry]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE accounts SET tier = ?2, real_cents = ?3, vault_cents = ?4, \
             withdrawable_cents = ?5, loss_streak = ?6, total_plays = ?7, \
             total_wagered_cents = ?8, deposit_rollover_cents = ?9, bonus_rollover_cents = ?10, \
             total_deposited_cents = ?11, last_deposit_cents = ?12, affiliate_id = ?13 \
             WHERE id = ?1",
            params![
                account.id.0,
                account.tier.as_str(),
                account.balances.real.cents(),
                account.balances.bonus_vault.cents(),
                account.balances.withdrawable.cents(),
                account.play.loss_streak,
                account.play.total_plays,
                account.rollover.total_wagered.cents(),
                account.rollover.deposit.cents(),
                account.rollover.bonus.cents(),
                account.deposits.total_deposited.cents(),
                account.deposits.last_deposit_amount.cents(),
                account.affiliate.map(|affiliate| affiliate.0),
            ],
        )?;
        if updated == 0 {
            // Dropping the transaction rolls it back.
            return Err(StoreError::MissingAccount(account.id));
        }
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO ledger (account_id, kind, amount_cents, description, created_at_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for entry in ledger {
                insert.execute(params![
                    entry.account.0,
                    entry.kind.as_str(),
                    entry.amount.cents(),
                    entry.description,
                    entry.created_at_ms,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn ledger(&self, id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT kind, amount_cents, description, created_at_ms FROM ledger \
             WHERE account_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![id.0], |row| {
            Ok((
                row.get::<_, String>(0)?,
                money(row, 1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (kind, amount, description, created_at_ms) = row?;
            let kind = LedgerKind::parse(&kind)
                .ok_or_else(|| StoreError::Corrupt(format!("ledger kind {kind:?}")))?;
            entries.push(LedgerEntry::new(id, kind, amount, description, created_at_ms));
        }
        Ok(entries)
    }

    fn create_session(
        &self,
        token: &str,
        account: AccountId,
        created_at_ms: u64,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let exists = conn
            .query_row("SELECT 1 FROM accounts WHERE id = ?1", params![account.0], |_| Ok(()))
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::MissingAccount(account));
        }
        conn.execute(
            "INSERT INTO sessions (token, account_id, created_at_ms) VALUES (?1, ?2, ?3)",
            params![token, account.0, created_at_ms],
        )
        .map_err(|err| {
            if is_constraint_violation(&err) {
                StoreError::Conflict("session token".to_string())
            } else {
                err.into()
            }
        })?;
        Ok(())
    }

    fn resolve_session(&self, token: &str) -> Result<Option<AccountId>, StoreError> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                "SELECT account_id FROM sessions WHERE token = ?1",
                params![token],
                |row| row.get::<_, u64>(0),
            )
            .optional()?;
        Ok(account.map(AccountId))
    }

    fn create_affiliate(
        &self,
        name: &str,
        referral_code: &str,
        bonus_amount: Money,
    ) -> Result<Affiliate, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO affiliates (name, referral_code, bonus_cents) VALUES (?1, ?2, ?3)",
            params![name, referral_code, bonus_amount.cents()],
        )
        .map_err(|err| {
            if is_constraint_violation(&err) {
                StoreError::Conflict(format!("referral code {referral_code:?}"))
            } else {
                err.into()
            }
        })?;
        let id = u64::try_from(conn.last_insert_rowid())
            .map_err(|_| StoreError::Corrupt("negative affiliate id".to_string()))?;
        Ok(Affiliate {
            id: AffiliateId(id),
            name: name.to_string(),
            referral_code: referral_code.to_string(),
            bonus_amount,
        })
    }

    fn find_affiliate(&self, referral_code: &str) -> Result<Option<Affiliate>, StoreError> {
        let conn = self.conn()?;
        let affiliate = conn
            .query_row(
                "SELECT id, name, referral_code, bonus_cents FROM affiliates \
                 WHERE referral_code = ?1",
                params![referral_code],
                |row| {
                    Ok(Affiliate {
                        id: AffiliateId(row.get(0)?),
                        name: row.get(1)?,
                        referral_code: row.get(2)?,
                        bonus_amount: money(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(affiliate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sqlite_round_trips_account() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("raspa.db")).unwrap();
        let mut account = store.create_account(Money::from_units(20), 77).unwrap();
        account.tier = Tier::Vip;
        account.balances.bonus_vault = Money::from_units(100);
        account.play.total_plays = 4;
        account.play.loss_streak = 0;
        account.rollover.deposit = Money::from_cents(450);
        account.deposits.last_deposit_amount = Money::from_units(150);
        let partner = store
            .create_affiliate("Partner", "PARTNER10", Money::from_units(10))
            .unwrap();
        account.affiliate = Some(partner.id);
        store.commit(&account, &[]).unwrap();

        assert_eq!(store.load(account.id).unwrap(), Some(account));
        assert_eq!(store.load(AccountId(999)).unwrap(), None);
    }

    #[test]
    fn test_sqlite_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raspa.db");
        let id = {
            let store = SqliteStore::open(&path).unwrap();
            let mut account = store.create_account(Money::ZERO, 1).unwrap();
            account.balances.real = Money::from_cents(1_234);
            let entry =
                LedgerEntry::new(account.id, LedgerKind::Deposit, Money::from_cents(1_234), "pix", 2);
            store.commit(&account, &[entry]).unwrap();
            account.id
        };

        let store = SqliteStore::open(&path).unwrap();
        let account = store.load(id).unwrap().unwrap();
        assert_eq!(account.balances.real, Money::from_cents(1_234));
        let ledger = store.ledger(id).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].kind, LedgerKind::Deposit);
    }

    #[test]
    fn test_sqlite_sessions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("raspa.db");
        let id = {
            let store = SqliteStore::open(&path).unwrap();
            let account = store.create_account(Money::ZERO, 0).unwrap();
            store.create_session("tok-1", account.id, 5).unwrap();
            assert!(matches!(
                store.create_session("tok-1", account.id, 6),
                Err(StoreError::Conflict(_))
            ));
            assert!(matches!(
                store.create_session("tok-2", AccountId(404), 6),
                Err(StoreError::MissingAccount(AccountId(404)))
            ));
            account.id
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.resolve_session("tok-1").unwrap(), Some(id));
        assert_eq!(store.resolve_session("tok-2").unwrap(), None);
    }

    #[test]
    fn test_sqlite_affiliate_codes_are_unique() {
        let store = SqliteStore::open_in_memory().unwrap();
        let partner = store
            .create_affiliate("Partner", "PARTNER10", Money::from_units(10))
            .unwrap();
        assert_eq!(store.find_affiliate("PARTNER10").unwrap(), Some(partner));
        assert_eq!(store.find_affiliate("NOPE").unwrap(), None);
        assert!(matches!(
            store.create_affiliate("Copy", "PARTNER10", Money::ZERO),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_sqlite_adds_affiliate_column_to_old_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE accounts (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     tier TEXT NOT NULL,
                     real_cents INTEGER NOT NULL,
                     vault_cents INTEGER NOT NULL,
                     withdrawable_cents INTEGER NOT NULL,
                     loss_streak INTEGER NOT NULL,
                     total_plays INTEGER NOT NULL,
                     total_wagered_cents INTEGER NOT NULL,
                     deposit_rollover_cents INTEGER NOT NULL,
                     bonus_rollover_cents INTEGER NOT NULL,
                     total_deposited_cents INTEGER NOT NULL,
                     last_deposit_cents INTEGER NOT NULL,
                     created_at_ms INTEGER NOT NULL
                 );
                 INSERT INTO accounts VALUES (1, 'standard', 500, 0, 0, 0, 0, 0, 0, 0, 0, 0, 9);",
            )
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let account = store.load(AccountId(1)).unwrap().unwrap();
        assert_eq!(account.balances.real, Money::from_units(5));
        assert_eq!(account.affiliate, None);
    }

    #[test]
    fn test_sqlite_commit_missing_account_writes_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ghost = Account::new(AccountId(5), 0);
        let entry = LedgerEntry::new(ghost.id, LedgerKind::GameBet, Money::from_units(1), "bet", 0);
        assert!(matches!(
            store.commit(&ghost, &[entry]),
            Err(StoreError::MissingAccount(AccountId(5)))
        ));
        assert!(store.ledger(ghost.id).unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_rejects_unknown_tier() {
        let store = SqliteStore::open_in_memory().unwrap();
        let account = store.create_account(Money::ZERO, 0).unwrap();
        store
            .conn()
            .unwrap()
            .execute("UPDATE accounts SET tier = 'gold' WHERE id = ?1", params![account.id.0])
            .unwrap();
        assert!(matches!(store.load(account.id), Err(StoreError::Corrupt(_))));
    }
}
