//! SQLite snapshot of the spreadsheet directory.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use super::CacheError;
use crate::sheets::{ClientDebt, DirectorySnapshot, ListStatus};

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS directory (
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        PRIMARY KEY (kind, name)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS list_status (
        client TEXT PRIMARY KEY COLLATE NOCASE,
        status TEXT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS debts (
        client TEXT PRIMARY KEY COLLATE NOCASE,
        orders_count INTEGER NOT NULL,
        total_amount REAL NOT NULL,
        total_paid REAL NOT NULL,
        total_debt REAL NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS sync_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        last_synced_at INTEGER NOT NULL,
        rows_synced INTEGER NOT NULL
    )
    ",
];

const KIND_CLIENT: &str = "client";
const KIND_DESIGNER: &str = "designer";

/// When the cache was last filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncInfo {
    pub last_synced_at: DateTime<Utc>,
    pub rows_synced: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct DebtRow {
    client: String,
    orders_count: i64,
    total_amount: f64,
    total_paid: f64,
    total_debt: f64,
}

impl From<DebtRow> for ClientDebt {
    fn from(row: DebtRow) -> Self {
        Self {
            client: row.client,
            orders_count: u32::try_from(row.orders_count).unwrap_or_default(),
            total_amount: row.total_amount,
            total_paid: row.total_paid,
            total_debt: row.total_debt,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SyncMetaRow {
    last_synced_at: i64,
    rows_synced: i64,
}

/// Local cache database.
#[derive(Debug, Clone)]
pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    /// Opens (creating if needed) the cache at `path` and its parent directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the database
    /// cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Opened cache database {}", path.display());
        Ok(store)
    }

    /// Opens a private in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot be initialized.
    pub async fn open_in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Creates missing tables.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub async fn migrate(&self) -> Result<(), CacheError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Replaces the whole cache with `snapshot` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the previous snapshot is
    /// kept in that case.
    pub async fn replace_snapshot(
        &self,
        snapshot: &DirectorySnapshot,
        synced_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let mut tx = self.pool.begin().await?;

        for table in ["directory", "list_status", "debts"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }

        let names = snapshot
            .clients
            .iter()
            .map(|n| (KIND_CLIENT, n))
            .chain(snapshot.designers.iter().map(|n| (KIND_DESIGNER, n)));
        for (kind, name) in names {
            sqlx::query("INSERT OR IGNORE INTO directory (kind, name) VALUES (?, ?)")
                .bind(kind)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        for (client, status) in &snapshot.list_status {
            sqlx::query("INSERT OR REPLACE INTO list_status (client, status) VALUES (?, ?)")
                .bind(client)
                .bind(status.as_str())
                .execute(&mut *tx)
                .await?;
        }

        for debt in &snapshot.debts {
            sqlx::query(
                r"
                INSERT OR REPLACE INTO debts
                    (client, orders_count, total_amount, total_paid, total_debt)
                VALUES (?, ?, ?, ?, ?)
                ",
            )
            .bind(&debt.client)
            .bind(i64::from(debt.orders_count))
            .bind(debt.total_amount)
            .bind(debt.total_paid)
            .bind(debt.total_debt)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r"
            INSERT INTO sync_meta (id, last_synced_at, rows_synced) VALUES (1, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                last_synced_at = excluded.last_synced_at,
                rows_synced = excluded.rows_synced
            ",
        )
        .bind(synced_at.timestamp())
        .bind(i64::try_from(snapshot.rows_read).unwrap_or(i64::MAX))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            "Cache replaced: {} clients, {} designers, {} debts",
            snapshot.clients.len(),
            snapshot.designers.len(),
            snapshot.debts.len()
        );
        Ok(())
    }

    async fn names(&self, kind: &str) -> Result<Vec<String>, CacheError> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT name FROM directory WHERE kind = ? ORDER BY name COLLATE NOCASE",
        )
        .bind(kind)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Known client names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn clients(&self) -> Result<Vec<String>, CacheError> {
        self.names(KIND_CLIENT).await
    }

    /// Known designer names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn designers(&self) -> Result<Vec<String>, CacheError> {
        self.names(KIND_DESIGNER).await
    }

    /// Cached list of a client, matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_status(&self, client: &str) -> Result<Option<ListStatus>, CacheError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM list_status WHERE client = ?")
                .bind(client.trim())
                .fetch_optional(&self.pool)
                .await?;
        Ok(status.as_deref().and_then(ListStatus::parse))
    }

    /// Clients on a list, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn listed(&self, status: ListStatus) -> Result<Vec<String>, CacheError> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT client FROM list_status WHERE status = ? ORDER BY client COLLATE NOCASE",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    /// Clients with outstanding debt, largest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn debtors(&self) -> Result<Vec<ClientDebt>, CacheError> {
        let rows = sqlx::query_as::<_, DebtRow>(
            r"
            SELECT client, orders_count, total_amount, total_paid, total_debt
            FROM debts
            WHERE total_debt > ?
            ORDER BY total_debt DESC, client
            ",
        )
        .bind(ClientDebt::THRESHOLD)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ClientDebt::from).collect())
    }

    /// Last successful sync, `None` before the first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn last_sync(&self) -> Result<Option<SyncInfo>, CacheError> {
        let row = sqlx::query_as::<_, SyncMetaRow>(
            "SELECT last_synced_at, rows_synced FROM sync_meta WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|r| {
            DateTime::from_timestamp(r.last_synced_at, 0).map(|last_synced_at| SyncInfo {
                last_synced_at,
                rows_synced: r.rows_synced,
            })
        }))
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
