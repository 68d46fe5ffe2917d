//! Repository for the `assets` table.

use sqlx::PgPool;

use modella_core::types::DbId;

use crate::models::asset::{Asset, NewResultAsset};

/// Column list for `assets` queries.
const COLUMNS: &str = "\
    id, user_id, filename, display_name, original_filename, \
    file_path, file_url, asset_kind, mime_type, file_size, created_at";

/// Provides lookup and result-registration operations for assets.
/// Upload-side CRUD is owned by the surrounding application.
pub struct AssetRepo;

impl AssetRepo {
    /// Find an asset by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Asset>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM assets WHERE id = $1");
        sqlx::query_as::<_, Asset>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Register a generated result. The remote URL doubles as both the
    /// storage path and the public URL; the size is unknown for
    /// externally-hosted outputs.
    pub async fn create_result(
        pool: &PgPool,
        input: &NewResultAsset,
    ) -> Result<Asset, sqlx::Error> {
        let query = format!(
            "INSERT INTO assets \
                 (user_id, filename, display_name, original_filename, \
                  file_path, file_url, asset_kind, mime_type, file_size) \
             VALUES ($1, $2, $2, $2, $3, $3, $4, $5, 0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Asset>(&query)
            .bind(input.user_id)
            .bind(&input.display_name)
            .bind(&input.file_url)
            .bind(input.asset_kind)
            .bind(input.mime_type)
            .fetch_one(pool)
            .await
    }
}
