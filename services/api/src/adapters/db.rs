//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the PostgreSQL implementation of the
//! `FavoriteStore` port from the `core` crate. It handles all interactions with the
//! database using `sqlx`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use logosnap_core::{FavoriteEntry, FavoriteStore, ImageRef, Logo, LogoId, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `FavoriteStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct FavoriteRecord {
    id: Uuid,
    prompt: String,
    source_url: String,
    image: Vec<u8>,
    created_at: DateTime<Utc>,
    favorited_at: Option<DateTime<Utc>>,
}

impl FavoriteRecord {
    fn to_domain(self) -> FavoriteEntry {
        // Rows written before favorite timestamps were recorded sort by creation time.
        let favorited_at = self.favorited_at.unwrap_or(self.created_at);
        let logo = Logo {
            id: self.id,
            image: ImageRef {
                source_url: self.source_url,
                display_url: None,
                data: Bytes::from(self.image),
            },
            prompt: self.prompt,
            created_at: self.created_at,
        };
        FavoriteEntry::new(logo, favorited_at)
    }
}

//=========================================================================================
// `FavoriteStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl FavoriteStore for DbAdapter {
    async fn persist_favorite(&self, entry: &FavoriteEntry) -> PortResult<bool> {
        let result = sqlx::query(
            "INSERT INTO favorites (id, prompt, source_url, image, created_at, favorited_at) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO NOTHING",
        )
        .bind(entry.logo.id)
        .bind(&entry.logo.prompt)
        .bind(&entry.logo.image.source_url)
        .bind(entry.logo.image.data.as_ref())
        .bind(entry.logo.created_at)
        .bind(entry.favorited_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_favorite_persisted(&self, id: LogoId) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM favorites WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_persisted_favorites(&self) -> PortResult<Vec<FavoriteEntry>> {
        let records = sqlx::query_as::<_, FavoriteRecord>(
            "SELECT id, prompt, source_url, image, created_at, favorited_at FROM favorites \
             ORDER BY COALESCE(favorited_at, created_at) ASC, inserted_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let favorites = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(favorites)
    }
}
