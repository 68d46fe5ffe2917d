//! Asset entity model and DTOs.
//!
//! Assets are immutable references to an image or video: either an
//! uploaded input or a generated result whose `file_url` points at the
//! remote output.

use serde::Serialize;
use sqlx::FromRow;

use modella_core::types::{DbId, Timestamp};

/// Uploaded input asset kinds. Result kinds come from
/// `StepKind::result_asset_kind`.
pub const KIND_MODEL_IMAGE: &str = "model_image";
pub const KIND_CLOTHING_IMAGE: &str = "clothing_image";
pub const KIND_BACKGROUND_IMAGE: &str = "background_image";
pub const KIND_REFERENCE_VIDEO: &str = "reference_video";

/// A row from the `assets` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Asset {
    pub id: DbId,
    pub user_id: DbId,
    pub filename: String,
    /// Human-friendly name used for display and download naming. For
    /// generated results this is `<project>_<step>_<timestamp>.<ext>`.
    pub display_name: Option<String>,
    pub original_filename: String,
    pub file_path: String,
    pub file_url: String,
    pub asset_kind: String,
    pub mime_type: String,
    pub file_size: i64,
    pub created_at: Timestamp,
}

/// DTO for registering a generated result asset.
#[derive(Debug, Clone)]
pub struct NewResultAsset {
    pub user_id: DbId,
    pub display_name: String,
    /// Remote result URL, stored as both `file_path` and `file_url`.
    pub file_url: String,
    pub asset_kind: &'static str,
    pub mime_type: &'static str,
}
