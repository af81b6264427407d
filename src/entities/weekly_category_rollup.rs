//! Weekly category rollup entity - Materialized snapshot rows.
//!
//! One row per (ISO week, category) per snapshot version. Readers only look at the
//! version recorded as active in `rollup_state`. The unique index over
//! (`snapshot_version`, `week_start`, `category`) is created separately by the
//! materialization engine, never by table creation.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Weekly category rollup database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "weekly_category_rollup")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub snapshot_version: i64,
    /// Monday of the ISO week
    pub week_start: Date,
    pub category: String,
    pub orders_in_category: i64,
    pub unique_customers_in_category: i64,
    pub revenue_in_category: f64,
    pub items_sold_in_category: i64,
    pub avg_order_value_in_category: f64,
    pub unique_products_in_category: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
