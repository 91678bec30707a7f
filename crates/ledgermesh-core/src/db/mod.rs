//! Storage layer: connection pooling, migrations, and per-domain operations
//!
//! This module is organized by domain:
//! - `observations` - the append-only deduplicating observation store
//! - `aggregates` - canonical transactions, the link table, review queue
//! - `sessions` - import session lifecycle and counters
//! - `ops_log` - the append-only audit of manual operations
//! - `categories` - user-defined categories
//! - `watch` - poll-based change watching for UI consumers

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod aggregates;
mod categories;
mod observations;
mod ops_log;
mod sessions;
mod watch;


pub use observations::ObservationInsert;
pub use watch::{AggregateWatch, LinkWatch};

pub(crate) use aggregates::EditValue;
pub(crate) use ops_log::NewOpsLogEntry;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "LEDGERMESH_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the
/// same key regardless of database path; the database file can be moved,
/// renamed or restored freely.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this salt would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"ledgermesh-v1-sa";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores "YYYY-MM-DD HH:MM:SS"
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Format a DateTime<Utc> the way SQLite's CURRENT_TIMESTAMP does
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parse a stored enum string, reporting failures as conversion errors
pub(crate) fn parse_enum<T>(idx: usize, s: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
    /// Whether the pool was opened with an encryption key
    keyed: bool,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `LEDGERMESH_DB_KEY` to be set; the SQLCipher key is derived
    /// from the passphrase via Argon2. Use `new_unencrypted()` for
    /// development and testing.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} with your passphrase, \
                or use an unencrypted database (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption passphrase
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            // Set the key on every new connection before it touches a page
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });
            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
            keyed: passphrase.is_some(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Check if the database is encrypted
    ///
    /// True only when this pool was opened with a key and the underlying
    /// build actually carries SQLCipher (`PRAGMA cipher_version` answers).
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        let cipher: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(cipher.is_ok() && self.keyed)
    }

    /// Create a throwaway database for testing
    ///
    /// Uses a temporary file rather than `:memory:` so every pooled
    /// connection sees the same database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = format!(
            "{}/ledgermesh_test_{}_{}.db",
            std::env::temp_dir().display(),
            std::process::id(),
            id
        );
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block the single writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Categories (user-owned; aggregates reference them)
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Import sessions (one per ingestion run)
            CREATE TABLE IF NOT EXISTS import_sessions (
                id INTEGER PRIMARY KEY,
                source_type TEXT NOT NULL,
                source_locator TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING',
                total INTEGER NOT NULL DEFAULT 0,
                imported INTEGER NOT NULL DEFAULT 0,
                skipped INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                started_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                completed_at DATETIME
            );

            CREATE INDEX IF NOT EXISTS idx_import_sessions_status ON import_sessions(status);

            -- Observations: append-only, write-once, deduplicated by content hash
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY,
                source_type TEXT NOT NULL,
                source_locator TEXT NOT NULL,
                raw_payload TEXT NOT NULL,
                amount_minor INTEGER NOT NULL CHECK (amount_minor >= 0),
                currency TEXT NOT NULL,
                timestamp INTEGER,
                timestamp_date_only BOOLEAN NOT NULL DEFAULT 0,
                direction TEXT NOT NULL DEFAULT 'UNKNOWN',
                reference TEXT,
                counterparty TEXT,
                account_hint TEXT,
                parse_confidence REAL NOT NULL DEFAULT 0,
                content_hash TEXT NOT NULL UNIQUE,
                import_session_id INTEGER REFERENCES import_sessions(id),
                fp_ref TEXT,
                fp_amt_time TEXT,
                fp_amt_day TEXT,
                fp_sender_amt TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_observations_fp_ref ON observations(fp_ref);
            CREATE INDEX IF NOT EXISTS idx_observations_fp_amt_time ON observations(fp_amt_time);
            CREATE INDEX IF NOT EXISTS idx_observations_fp_amt_day ON observations(fp_amt_day);
            CREATE INDEX IF NOT EXISTS idx_observations_fp_sender_amt ON observations(fp_sender_amt);
            CREATE INDEX IF NOT EXISTS idx_observations_session ON observations(import_session_id);

            -- Aggregates: canonical transactions projected from observations
            CREATE TABLE IF NOT EXISTS aggregates (
                id INTEGER PRIMARY KEY,
                canonical_amount_minor INTEGER NOT NULL,
                canonical_currency TEXT NOT NULL,
                canonical_timestamp INTEGER,
                is_approx_time BOOLEAN NOT NULL DEFAULT 0,
                canonical_direction TEXT NOT NULL DEFAULT 'UNKNOWN',
                canonical_reference TEXT,
                canonical_counterparty TEXT,
                canonical_account_hint TEXT,
                confidence_score INTEGER NOT NULL DEFAULT 0,
                category_id INTEGER REFERENCES categories(id),
                user_notes TEXT,
                observation_count INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_aggregates_timestamp ON aggregates(canonical_timestamp);
            CREATE INDEX IF NOT EXISTS idx_aggregates_amount ON aggregates(canonical_amount_minor);
            CREATE INDEX IF NOT EXISTS idx_aggregates_confidence ON aggregates(confidence_score);

            -- Aggregate ↔ observation links (many-to-many)
            CREATE TABLE IF NOT EXISTS observation_links (
                aggregate_id INTEGER NOT NULL REFERENCES aggregates(id) ON DELETE CASCADE,
                observation_id INTEGER NOT NULL REFERENCES observations(id) ON DELETE CASCADE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (aggregate_id, observation_id)
            );

            CREATE INDEX IF NOT EXISTS idx_observation_links_observation
                ON observation_links(observation_id);

            -- Ops log: append-only audit of manual operations
            CREATE TABLE IF NOT EXISTS ops_log (
                id INTEGER PRIMARY KEY,
                op_type TEXT NOT NULL,
                target_aggregate_id INTEGER NOT NULL,
                secondary_aggregate_id INTEGER,
                affected_observation_ids TEXT NOT NULL DEFAULT '',
                field_name TEXT,
                old_value TEXT,
                new_value TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_ops_log_target ON ops_log(target_aggregate_id);
            CREATE INDEX IF NOT EXISTS idx_ops_log_created ON ops_log(created_at);
            "#,
        )?;

        info!("Database migrations complete");
        Ok(())
    }
}
