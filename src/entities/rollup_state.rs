//! Rollup state entity - Version and lock bookkeeping for materialized rollups.
//!
//! One row per materialized rollup. `active_version` is the snapshot readers see;
//! swapping it is the only visible state transition of a refresh.
//! `refresh_in_progress` is the lock flag claimed by a non-blocking refresh.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Rollup state database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rollup_state")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Name of the materialized rollup (e.g., `"weekly_category_rollup"`)
    #[sea_orm(unique)]
    pub rollup_name: String,
    /// Snapshot version currently visible to readers; 0 before the first build
    pub active_version: i64,
    /// Next version number to hand out
    pub next_version: i64,
    /// Set while a non-blocking refresh holds the rollup
    pub refresh_in_progress: bool,
    /// Number of rows in the active snapshot
    pub row_count: i64,
    /// When the active snapshot was swapped in
    pub refreshed_at: Option<DateTime>,
}

/// `RollupState` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
