//! Monthly rollup entity - Materialized snapshot rows, one per calendar month per version.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Monthly rollup database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monthly_rollup")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub snapshot_version: i64,
    /// First day of the month
    pub month_start: Date,
    pub year: i32,
    pub month: i32,
    pub total_orders: i64,
    pub unique_customers: i64,
    pub total_revenue: f64,
    pub total_items_sold: i64,
    pub avg_order_value: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
