// SQLite-backed store for persistent automod data.
//
// Tables:
// - automod_settings: Per-scope settings, stored as one JSON document
// - temp_mutes: Outstanding temporary mutes for the expiry sweep
// - slowmode_restrictions: Outstanding per-actor slow-mode restrictions
//
// Settings are nested (five category payloads plus ignore/allow lists), so
// they go into a single JSON column instead of two dozen flat ones; the
// mute/restriction records are flat and queried by the sweeper, so they get
// real columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

use crate::core::automod::{IgnoreSet, ScopeConfigStore, ScopeSettings, StoreError};
use crate::core::scheduler::{ModerationStateStore, SlowmodeRestriction, TempMute};

pub struct SqliteModStore {
    pool: Pool<Sqlite>,
}

impl SqliteModStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS automod_settings (
                scope_id INTEGER PRIMARY KEY,
                settings TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS temp_mutes (
                scope_id INTEGER NOT NULL,
                actor_id INTEGER NOT NULL,
                muted_until TEXT NOT NULL,
                PRIMARY KEY (scope_id, actor_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS slowmode_restrictions (
                scope_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                actor_id INTEGER NOT NULL,
                applied_at TEXT NOT NULL,
                duration_secs INTEGER NOT NULL,
                PRIMARY KEY (scope_id, channel_id, actor_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    fn parse_timestamp(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }
}

#[async_trait]
impl ScopeConfigStore for SqliteModStore {
    async fn get_scope_settings(&self, scope_id: u64) -> Result<ScopeSettings, StoreError> {
        let row = sqlx::query("SELECT settings FROM automod_settings WHERE scope_id = ?")
            .bind(scope_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        match row {
            Some(row) => {
                let raw: String = row.get("settings");
                serde_json::from_str(&raw).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            // Unconfigured scopes get the defaults, where everything is off.
            None => Ok(ScopeSettings::default()),
        }
    }

    async fn get_ignore_set(&self, scope_id: u64) -> Result<IgnoreSet, StoreError> {
        Ok(self.get_scope_settings(scope_id).await?.ignored)
    }

    async fn set_scope_settings(
        &self,
        scope_id: u64,
        settings: ScopeSettings,
    ) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&settings)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO automod_settings (scope_id, settings)
            VALUES (?, ?)
            ON CONFLICT(scope_id) DO UPDATE SET
                settings = excluded.settings
            "#,
        )
        .bind(scope_id as i64)
        .bind(raw)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ModerationStateStore for SqliteModStore {
    async fn list_scopes(&self) -> Result<Vec<u64>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT scope_id FROM temp_mutes
            UNION
            SELECT scope_id FROM slowmode_restrictions
            ORDER BY scope_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| row.get::<i64, _>("scope_id") as u64)
            .collect())
    }

    async fn temp_mutes(&self, scope_id: u64) -> Result<Vec<TempMute>, StoreError> {
        let rows = sqlx::query("SELECT actor_id, muted_until FROM temp_mutes WHERE scope_id = ?")
            .bind(scope_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| TempMute {
                actor_id: row.get::<i64, _>("actor_id") as u64,
                muted_until: Self::parse_timestamp(&row.get::<String, _>("muted_until")),
            })
            .collect())
    }

    async fn set_temp_mute(&self, scope_id: u64, mute: TempMute) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO temp_mutes (scope_id, actor_id, muted_until)
            VALUES (?, ?, ?)
            ON CONFLICT(scope_id, actor_id) DO UPDATE SET
                muted_until = excluded.muted_until
            "#,
        )
        .bind(scope_id as i64)
        .bind(mute.actor_id as i64)
        .bind(mute.muted_until.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn clear_temp_mute(&self, scope_id: u64, actor_id: u64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM temp_mutes WHERE scope_id = ? AND actor_id = ?")
            .bind(scope_id as i64)
            .bind(actor_id as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn restrictions(&self, scope_id: u64) -> Result<Vec<SlowmodeRestriction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT channel_id, actor_id, applied_at, duration_secs
            FROM slowmode_restrictions
            WHERE scope_id = ?
            "#,
        )
        .bind(scope_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| SlowmodeRestriction {
                channel_id: row.get::<i64, _>("channel_id") as u64,
                actor_id: row.get::<i64, _>("actor_id") as u64,
                applied_at: Self::parse_timestamp(&row.get::<String, _>("applied_at")),
                duration_secs: row.get::<i64, _>("duration_secs") as u64,
            })
            .collect())
    }

    async fn set_restriction(
        &self,
        scope_id: u64,
        restriction: SlowmodeRestriction,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO slowmode_restrictions
                (scope_id, channel_id, actor_id, applied_at, duration_secs)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(scope_id, channel_id, actor_id) DO UPDATE SET
                applied_at = excluded.applied_at,
                duration_secs = excluded.duration_secs
            "#,
        )
        .bind(scope_id as i64)
        .bind(restriction.channel_id as i64)
        .bind(restriction.actor_id as i64)
        .bind(restriction.applied_at.to_rfc3339())
        .bind(restriction.duration_secs as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn clear_restriction(
        &self,
        scope_id: u64,
        channel_id: u64,
        actor_id: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM slowmode_restrictions
            WHERE scope_id = ? AND channel_id = ? AND actor_id = ?
            "#,
        )
        .bind(scope_id as i64)
        .bind(channel_id as i64)
        .bind(actor_id as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
