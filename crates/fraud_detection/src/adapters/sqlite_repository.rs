// Rust guideline compliant 2026-10-12

//! SQLite adapter for the `TransactionRepository` port.
//!
//! Rows live in a single `transactions` table whose column names follow the
//! external schema. `hora` is stored as RFC 3339 text with microseconds and a
//! `Z` suffix, so text order equals time order.

use chrono::{DateTime, SecondsFormat, Utc};
use domain::{
    NewTransaction, StoreError, Transaction, TransactionId, TransactionRepository,
    TransactionStatus,
};
use sqlx::Row as _;
use sqlx::sqlite::SqliteRow;

const SELECT_COLUMNS: &str = "SELECT id, cuenta_origen, cuenta_destino, monto, ubicacion, hora, status FROM transactions";

/// `TransactionRepository` backed by a SQLite database via `sqlx`.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    pool: sqlx::SqlitePool,
}

impl SqliteRepository {
    /// Open or create the database at `db_url` and ensure the schema exists.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` when the connection or schema creation fails.
    pub async fn new(db_url: &str) -> Result<Self, sqlx::Error> {
        let opts = db_url
            .parse::<sqlx::sqlite::SqliteConnectOptions>()?
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(opts).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transactions (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                cuenta_origen  TEXT    NOT NULL,
                cuenta_destino TEXT    NOT NULL,
                monto          REAL    NOT NULL,
                ubicacion      TEXT    NOT NULL,
                hora           TEXT    NOT NULL,
                status         TEXT    NOT NULL DEFAULT 'PENDING'
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS transactions_status_hora ON transactions (status, hora)")
            .execute(&pool)
            .await?;
        Ok(Self { pool })
    }

    /// Close the pool, waiting for connections to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn backend(context: &str, error: &sqlx::Error) -> StoreError {
    tracing::error!(%error, "sqlite.{context}.failed");
    StoreError::Backend { reason: error.to_string() }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_row(row: &SqliteRow) -> Result<Transaction, StoreError> {
    let corrupt = |reason: String| StoreError::Backend { reason };
    let hora: String = row.try_get("hora").map_err(|e| corrupt(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| corrupt(e.to_string()))?;
    Ok(Transaction {
        id: row.try_get("id").map_err(|e| corrupt(e.to_string()))?,
        origin_account: row.try_get("cuenta_origen").map_err(|e| corrupt(e.to_string()))?,
        destination_account: row.try_get("cuenta_destino").map_err(|e| corrupt(e.to_string()))?,
        amount: row.try_get("monto").map_err(|e| corrupt(e.to_string()))?,
        location: row.try_get("ubicacion").map_err(|e| corrupt(e.to_string()))?,
        created_at: DateTime::parse_from_rfc3339(&hora)
            .map_err(|e| corrupt(format!("bad hora {hora:?}: {e}")))?
            .with_timezone(&Utc),
        status: status
            .parse::<TransactionStatus>()
            .map_err(|e| corrupt(e.to_string()))?,
    })
}

impl TransactionRepository for SqliteRepository {
    async fn insert(
        &self,
        new: NewTransaction,
        created_at: DateTime<Utc>,
    ) -> Result<Transaction, StoreError> {
        let result = sqlx::query(
            "INSERT INTO transactions (cuenta_origen, cuenta_destino, monto, ubicacion, hora, status)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.origin_account)
        .bind(&new.destination_account)
        .bind(new.amount)
        .bind(&new.location)
        .bind(format_time(created_at))
        .bind(TransactionStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| backend("insert", &e))?;

        Ok(Transaction {
            id: result.last_insert_rowid(),
            origin_account: new.origin_account,
            destination_account: new.destination_account,
            amount: new.amount,
            location: new.location,
            created_at,
            status: TransactionStatus::Pending,
        })
    }

    async fn find(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| backend("find", &e))?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn set_status_if_pending(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE transactions SET status = ? WHERE id = ? AND status = 'PENDING'")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("set_status", &e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE status = 'PENDING' AND hora < ? ORDER BY hora, id"
        ))
        .bind(format_time(cutoff))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend("pending", &e))?;
        rows.iter().map(decode_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
