//! SQLite-backed identity store
//!
//! Reference [`UserStore`] implementation. Row and event are written in
//! one transaction, which is what gives the registry its "no row
//! without its event" guarantee.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::events::StoredEvent;
use crate::domain::identity::record::{FieldChanges, UserRecord};
use crate::domain::identity::store::UserStore;
use crate::error::{Error, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    local_id   TEXT PRIMARY KEY,
    global_id  TEXT NOT NULL UNIQUE,
    is_local   INTEGER NOT NULL,
    is_service INTEGER NOT NULL,
    is_enabled INTEGER NOT NULL,
    ms_max     INTEGER,
    ds_max     INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
    id         TEXT PRIMARY KEY,
    kind       TEXT NOT NULL,
    data       TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind);
";

pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Open (creating if missing) a database at `url`, e.g.
    /// `sqlite:///var/lib/keyward/auth.db`
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database, used by tests
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    async fn insert_event<'t>(
        tx: &mut sqlx::Transaction<'t, sqlx::Sqlite>,
        event: &StoredEvent,
    ) -> Result<()> {
        sqlx::query("INSERT INTO events (id, kind, data, created_at) VALUES (?, ?, ?, ?)")
            .bind(event.id.to_string())
            .bind(event.kind.as_str())
            .bind(event.data.to_string())
            .bind(event.created_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// All persisted events, oldest first (introspection/replication)
    pub async fn events(&self) -> Result<Vec<StoredEvent>> {
        let rows = sqlx::query("SELECT id, kind, data, created_at FROM events ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let kind: String = row.get("kind");
                let data: String = row.get("data");
                let created_at: DateTime<Utc> = row.get("created_at");
                Ok(StoredEvent {
                    id: parse_uuid(&id)?,
                    kind: serde_json::from_value(serde_json::Value::String(kind))
                        .map_err(|e| Error::Internal(format!("unknown event kind: {e}")))?,
                    data: serde_json::from_str(&data)
                        .map_err(|e| Error::Internal(format!("malformed event data: {e}")))?,
                    created_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn select_by_global_id(&self, global_id: &str) -> Result<Option<Uuid>> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT local_id FROM users WHERE global_id = ?")
                .bind(global_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|id| parse_uuid(&id)).transpose()
    }

    async fn select_by_local_id(&self, local_id: Uuid) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT local_id, global_id, is_local, is_service, is_enabled,
                    ms_max, ds_max, created_at, updated_at
             FROM users WHERE local_id = ?",
        )
        .bind(local_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.get("local_id");
        Ok(Some(UserRecord {
            local_id: parse_uuid(&id)?,
            global_id: row.get("global_id"),
            is_local: row.get("is_local"),
            is_service: row.get("is_service"),
            is_enabled: row.get("is_enabled"),
            ms_max: row.get::<Option<i64>, _>("ms_max").map(|v| v as u32),
            ds_max: row.get::<Option<i64>, _>("ds_max").map(|v| v as u32),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn insert_user(&self, record: &UserRecord, event: &StoredEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO users (local_id, global_id, is_local, is_service, is_enabled,
                                ms_max, ds_max, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.local_id.to_string())
        .bind(&record.global_id)
        .bind(record.is_local)
        .bind(record.is_service)
        .bind(record.is_enabled)
        .bind(record.ms_max.map(|v| v as i64))
        .bind(record.ds_max.map(|v| v as i64))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(Error::Duplicate(record.global_id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        Self::insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_user(
        &self,
        local_id: Uuid,
        changes: &FieldChanges,
        now: DateTime<Utc>,
        event: &StoredEvent,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let id = local_id.to_string();

        if let Some(is_enabled) = changes.is_enabled {
            sqlx::query("UPDATE users SET is_enabled = ? WHERE local_id = ?")
                .bind(is_enabled)
                .bind(&id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(ms_max) = changes.ms_max {
            sqlx::query("UPDATE users SET ms_max = ? WHERE local_id = ?")
                .bind(ms_max.map(|v| v as i64))
                .bind(&id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(ds_max) = changes.ds_max {
            sqlx::query("UPDATE users SET ds_max = ? WHERE local_id = ?")
                .bind(ds_max.map(|v| v as i64))
                .bind(&id)
                .execute(&mut *tx)
                .await?;
        }

        let updated = sqlx::query("UPDATE users SET updated_at = ? WHERE local_id = ?")
            .bind(now)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::UnknownUser(id));
        }

        Self::insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("malformed stored uuid: {e}")))
}
