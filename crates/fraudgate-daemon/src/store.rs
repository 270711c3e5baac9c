//! SQLite history store and attempt ledger.
//!
//! One database holds everything durable the gate consults:
//!
//! - `registration_attempts`: the append-only attempt ledger. Insert-only;
//!   no update or delete path exists in this module.
//! - `blocked_devices` / `suspicious_wallets`: externally maintained
//!   deny-lists with an `is_active` flag.
//! - `registrations` / `withdrawals`: prior-attempt history backing the
//!   reuse thresholds and the withdrawal velocity check.
//!
//! The connection lives behind an `Arc<Mutex<_>>` and the store is cheap to
//! clone. WAL mode keeps reader/writer interference low; the store itself
//! performs no retries and surfaces every SQLite failure to the gate, which
//! treats it as fail-closed.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

/// Storage failures. The gate maps any of these to a denied decision.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("history store lock poisoned")]
    LockPoisoned,
}

/// One row of the append-only attempt ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub ip: String,
    pub device_fingerprint: String,
    pub was_blocked: bool,
    pub block_reason: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Externally maintained device deny-list entry. A registration matching
/// any populated field of an active entry is denied.
#[derive(Debug, Clone, Default)]
pub struct BlockedDeviceEntry {
    pub device_fingerprint: Option<String>,
    pub ip_address: Option<String>,
    pub telegram_id: Option<String>,
    pub reason: Option<String>,
    pub is_active: bool,
}

/// Externally maintained wallet deny-list entry.
#[derive(Debug, Clone)]
pub struct SuspiciousWalletEntry {
    pub wallet_address: String,
    pub reason: Option<String>,
    pub is_active: bool,
}

/// A prior successful registration, as recorded by the backend.
#[derive(Debug, Clone)]
pub struct RegistrationRecord {
    pub profile_id: String,
    pub device_fingerprint: Option<String>,
    pub ip_address: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A prior withdrawal request, as recorded by the backend.
#[derive(Debug, Clone)]
pub struct WithdrawalRecord {
    pub profile_id: String,
    pub wallet_address: String,
    pub amount: f64,
    pub requested_at: DateTime<Utc>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS registration_attempts (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    ip_address         TEXT NOT NULL,
    device_fingerprint TEXT NOT NULL,
    was_blocked        INTEGER NOT NULL,
    block_reason       TEXT,
    attempted_at       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attempts_fingerprint
    ON registration_attempts(device_fingerprint);

CREATE TABLE IF NOT EXISTS blocked_devices (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    device_fingerprint TEXT,
    ip_address         TEXT,
    telegram_id        TEXT,
    reason             TEXT,
    is_active          INTEGER NOT NULL DEFAULT 1,
    created_at         INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS suspicious_wallets (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    wallet_address TEXT NOT NULL,
    reason         TEXT,
    is_active      INTEGER NOT NULL DEFAULT 1,
    created_at     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_wallets_address
    ON suspicious_wallets(wallet_address);

CREATE TABLE IF NOT EXISTS registrations (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id         TEXT NOT NULL,
    device_fingerprint TEXT,
    ip_address         TEXT,
    phone_number       TEXT,
    created_at         INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_registrations_fingerprint
    ON registrations(device_fingerprint);
CREATE INDEX IF NOT EXISTS idx_registrations_ip
    ON registrations(ip_address);

CREATE TABLE IF NOT EXISTS withdrawals (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id     TEXT NOT NULL,
    wallet_address TEXT NOT NULL,
    amount         REAL NOT NULL,
    requested_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_withdrawals_profile
    ON withdrawals(profile_id);
";

/// Durable history store backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Opens (creating if necessary) the database at `path` in WAL mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database. Test-oriented, but also usable for
    /// ephemeral deployments.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        debug!("history store schema ready");
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Appends one attempt record to the ledger. Insert-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails; the caller logs and moves on,
    /// it never aborts the surrounding operation.
    pub fn record_attempt(&self, record: &AttemptRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO registration_attempts
                 (ip_address, device_fingerprint, was_blocked, block_reason, attempted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.ip,
                record.device_fingerprint,
                record.was_blocked,
                record.block_reason,
                record.attempted_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    /// All ledger rows, oldest first. Audit/test surface; there is no way
    /// to mutate what this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_attempts(&self) -> Result<Vec<AttemptRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT ip_address, device_fingerprint, was_blocked, block_reason, attempted_at
             FROM registration_attempts ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AttemptRecord {
                ip: row.get(0)?,
                device_fingerprint: row.get(1)?,
                was_blocked: row.get(2)?,
                block_reason: row.get(3)?,
                attempted_at: Utc
                    .timestamp_opt(row.get::<_, i64>(4)?, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Adds a deny-list entry for a device/IP/telegram identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_blocked_device(&self, entry: &BlockedDeviceEntry) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO blocked_devices
                 (device_fingerprint, ip_address, telegram_id, reason, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.device_fingerprint,
                entry.ip_address,
                entry.telegram_id,
                entry.reason,
                entry.is_active,
                Utc::now().timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Adds a wallet deny-list entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_suspicious_wallet(&self, entry: &SuspiciousWalletEntry) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO suspicious_wallets (wallet_address, reason, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.wallet_address, entry.reason, entry.is_active, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Records a completed registration into history.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_registration(&self, record: &RegistrationRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO registrations
                 (profile_id, device_fingerprint, ip_address, phone_number, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.profile_id,
                record.device_fingerprint,
                record.ip_address,
                record.phone_number,
                record.created_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    /// Records a withdrawal request into history.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_withdrawal(&self, record: &WithdrawalRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO withdrawals (profile_id, wallet_address, amount, requested_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.profile_id,
                record.wallet_address,
                record.amount,
                record.requested_at.timestamp(),
            ],
        )?;
        Ok(())
    }

    /// True when an active deny-list entry matches this fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn is_device_blocked(&self, fingerprint: &str) -> Result<bool, StoreError> {
        self.active_block_match("device_fingerprint", fingerprint)
    }

    /// True when an active deny-list entry matches this network address.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn is_ip_blocked(&self, ip: &str) -> Result<bool, StoreError> {
        self.active_block_match("ip_address", ip)
    }

    /// True when an active deny-list entry matches this telegram id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn is_telegram_blocked(&self, telegram_id: &str) -> Result<bool, StoreError> {
        self.active_block_match("telegram_id", telegram_id)
    }

    fn active_block_match(&self, column: &str, value: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        // `column` is one of three literals above, never caller input.
        let sql = format!(
            "SELECT 1 FROM blocked_devices WHERE {column} = ?1 AND is_active = 1 LIMIT 1"
        );
        let hit: Option<i64> = conn.query_row(&sql, params![value], |row| row.get(0)).optional()?;
        Ok(hit.is_some())
    }

    /// True when an active wallet deny-list entry matches this address.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn is_wallet_suspicious(&self, wallet_address: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let hit: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM suspicious_wallets
                 WHERE wallet_address = ?1 AND is_active = 1 LIMIT 1",
                params![wallet_address],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Number of prior registrations recorded for this fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn count_registrations_by_fingerprint(&self, fingerprint: &str) -> Result<u32, StoreError> {
        self.count_registrations("device_fingerprint", fingerprint)
    }

    /// Number of prior registrations recorded from this network address.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn count_registrations_by_ip(&self, ip: &str) -> Result<u32, StoreError> {
        self.count_registrations("ip_address", ip)
    }

    /// Number of prior registrations recorded with this phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn count_registrations_by_phone(&self, phone: &str) -> Result<u32, StoreError> {
        self.count_registrations("phone_number", phone)
    }

    fn count_registrations(&self, column: &str, value: &str) -> Result<u32, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM registrations WHERE {column} = ?1");
        let count: i64 = conn.query_row(&sql, params![value], |row| row.get(0))?;
        Ok(count.max(0) as u32)
    }

    /// Number of withdrawal requests by this profile at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn count_withdrawals_since(
        &self,
        profile_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM withdrawals WHERE profile_id = ?1 AND requested_at >= ?2",
            params![profile_id, since.timestamp()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u32)
    }
}
