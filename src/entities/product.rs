//! Product entity - Catalog items that order lines reference.
//!
//! Prices are stored with two decimal places and are never negative.

use sea_orm::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Unique identifier for the product
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Product title shown in order details
    pub title: String,
    /// Current list price in currency units
    pub price: f64,
    /// Category used for category and weekly rollups
    pub category: String,
    /// When the product was created
    pub created_at: DateTime,
    /// When the product was last modified
    pub updated_at: DateTime,
}

/// Defines relationships between Product and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One product appears on many order lines
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if let Some(price) = super::active_value(&self.price) {
            if !price.is_finite() || price < 0.0 {
                return Err(super::invariant_violation(format_args!(
                    "product price must be >= 0, got {price}"
                )));
            }
        }
        if !insert {
            self.updated_at = Set(super::next_updated_at(&self.updated_at));
        }
        Ok(self)
    }
}
