//! SQLite-backed authorization store.
//!
//! Per-key atomicity comes from `INSERT .. ON CONFLICT(key) DO UPDATE`
//! upserts and a transaction around the ban's multi-table change. WAL with
//! `synchronous=FULL` keeps acknowledged bans durable across a crash.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::time::Duration;

use crate::models::{Ban, Deactivation, IssuedKey};

use super::{LicenseStore, StoreDump, StoreError, StoreResult};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Bounded wait for a pooled connection. A timed-out checkout surfaces as a
/// store fault, which the verification engine reports as a server error -
/// never as an approval.
const POOL_TIMEOUT: Duration = Duration::from_secs(5);

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteStore {
    pool: DbPool,
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = FULL;

        -- Issued keys, keyed by the canonical license key string
        CREATE TABLE IF NOT EXISTS issued_keys (
            key TEXT PRIMARY KEY,
            hwid TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            last_seen_at INTEGER
        );

        -- Bans match by key or by hardware id
        CREATE TABLE IF NOT EXISTS bans (
            key TEXT PRIMARY KEY,
            hwid TEXT NOT NULL DEFAULT '',
            reason TEXT NOT NULL,
            banned_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bans_hwid ON bans(hwid);

        CREATE TABLE IF NOT EXISTS deactivations (
            key TEXT PRIMARY KEY,
            reason TEXT NOT NULL,
            deactivated_at INTEGER NOT NULL
        );
        "#,
    )
}

fn issued_from_row(row: &Row) -> rusqlite::Result<IssuedKey> {
    Ok(IssuedKey {
        key: row.get(0)?,
        hwid: row.get(1)?,
        created_at: row.get(2)?,
        last_seen_at: row.get(3)?,
    })
}

fn ban_from_row(row: &Row) -> rusqlite::Result<Ban> {
    Ok(Ban {
        key: row.get(0)?,
        hwid: row.get(1)?,
        reason: row.get(2)?,
        banned_at: row.get(3)?,
    })
}

fn deactivation_from_row(row: &Row) -> rusqlite::Result<Deactivation> {
    Ok(Deactivation {
        key: row.get(0)?,
        reason: row.get(1)?,
        deactivated_at: row.get(2)?,
    })
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> StoreResult<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
        let pool = Pool::builder()
            .max_size(10)
            .connection_timeout(POOL_TIMEOUT)
            .build(manager)?;
        let conn = pool.get()?;
        init_schema(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// In-memory database for tests. Pool size is pinned to one connection -
    /// every pooled handle would otherwise get its own private database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(POOL_TIMEOUT)
            .build(manager)?;
        let conn = pool.get()?;
        init_schema(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }
}

impl LicenseStore for SqliteStore {
    fn get_issued(&self, key: &str) -> StoreResult<Option<IssuedKey>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT key, hwid, created_at, last_seen_at FROM issued_keys WHERE key = ?1",
            params![key],
            issued_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn create_issued(&self, key: &str, hwid: &str, now: i64) -> StoreResult<()> {
        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT INTO issued_keys (key, hwid, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, NULL)
             ON CONFLICT(key) DO NOTHING",
            params![key, hwid, now],
        )?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists);
        }
        Ok(())
    }

    fn upsert_issued_on_verify(&self, key: &str, hwid: &str, now: i64) -> StoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO issued_keys (key, hwid, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(key) DO UPDATE
             SET hwid = excluded.hwid, last_seen_at = excluded.last_seen_at",
            params![key, hwid, now],
        )?;
        Ok(())
    }

    fn find_ban(&self, key: &str, hwid: &str) -> StoreResult<Option<Ban>> {
        let conn = self.pool.get()?;
        // A key match is ordered first so the caller can report the ban's
        // reason; an hwid-only match yields the generic hardware ban.
        conn.query_row(
            "SELECT key, hwid, reason, banned_at FROM bans
             WHERE key = ?1 OR (?2 <> '' AND hwid = ?2)
             ORDER BY (key = ?1) DESC
             LIMIT 1",
            params![key, hwid],
            ban_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn find_deactivation(&self, key: &str) -> StoreResult<Option<Deactivation>> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT key, reason, deactivated_at FROM deactivations WHERE key = ?1",
            params![key],
            deactivation_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    fn ban(&self, key: &str, reason: &str, now: i64) -> StoreResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let hwid: String = tx
            .query_row(
                "SELECT hwid FROM issued_keys WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or_default();

        // A ban supersedes any deactivation for the key.
        tx.execute("DELETE FROM deactivations WHERE key = ?1", params![key])?;

        tx.execute(
            "INSERT INTO bans (key, hwid, reason, banned_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE
             SET hwid = excluded.hwid, reason = excluded.reason, banned_at = excluded.banned_at",
            params![key, hwid, reason, now],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn unban(&self, key: &str) -> StoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM bans WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn deactivate(&self, key: &str, reason: &str, now: i64) -> StoreResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO deactivations (key, reason, deactivated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE
             SET reason = excluded.reason, deactivated_at = excluded.deactivated_at",
            params![key, reason, now],
        )?;
        Ok(())
    }

    fn reactivate(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM deactivations WHERE key = ?1", params![key])?;
        tx.execute("DELETE FROM bans WHERE key = ?1", params![key])?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM issued_keys WHERE key = ?1", params![key])?;
        tx.execute("DELETE FROM bans WHERE key = ?1", params![key])?;
        tx.execute("DELETE FROM deactivations WHERE key = ?1", params![key])?;
        tx.commit()?;
        Ok(())
    }

    fn list_all(&self) -> StoreResult<StoreDump> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(
            "SELECT key, hwid, created_at, last_seen_at FROM issued_keys
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let keys = stmt
            .query_map([], issued_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT key, hwid, reason, banned_at FROM bans
             ORDER BY banned_at DESC, rowid DESC",
        )?;
        let banned = stmt
            .query_map([], ban_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT key, reason, deactivated_at FROM deactivations
             ORDER BY deactivated_at DESC, rowid DESC",
        )?;
        let deactivated = stmt
            .query_map([], deactivation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(StoreDump {
            keys,
            banned,
            deactivated,
        })
    }
}
