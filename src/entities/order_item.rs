//! Order item entity - One line of an order.
//!
//! `subtotal` behaves like a generated column: it is recomputed from `quantity` and
//! `unit_price` every time the row is saved, whatever the caller put in it.

use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

use crate::core::money::round2;

/// Order item database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    /// Unique identifier for the line
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning order; the line is deleted with it
    pub order_id: i64,
    /// Product sold on this line
    pub product_id: i64,
    /// Units sold, always positive
    pub quantity: i32,
    /// Price per unit at the time of sale
    pub unit_price: f64,
    /// `quantity * unit_price`, rounded to two decimals
    pub subtotal: f64,
    /// When the line was created
    pub created_at: DateTime,
    /// When the line was last modified
    pub updated_at: DateTime,
}

/// Defines relationships between `OrderItem` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each line belongs to one order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
    /// Each line references one product
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_delete = "Restrict"
    )]
    Product,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut quantity = super::active_value(&self.quantity);
        let mut unit_price = super::active_value(&self.unit_price);

        if let Some(q) = quantity {
            if q <= 0 {
                return Err(super::invariant_violation(format_args!(
                    "quantity must be > 0, got {q}"
                )));
            }
        }
        if let Some(p) = unit_price {
            if !p.is_finite() || p < 0.0 {
                return Err(super::invariant_violation(format_args!(
                    "unit price must be >= 0, got {p}"
                )));
            }
        }

        if quantity.is_none() || unit_price.is_none() {
            if insert {
                return Err(super::invariant_violation(
                    "order item needs quantity and unit price",
                ));
            }
            // A partial update: the missing input comes from the stored row.
            let Some(id) = super::active_value(&self.id) else {
                return Err(super::invariant_violation(
                    "order item update needs an id to recompute its subtotal",
                ));
            };
            let stored = Entity::find_by_id(id).one(db).await?.ok_or_else(|| {
                super::invariant_violation(format_args!("order item {id} does not exist"))
            })?;
            quantity.get_or_insert(stored.quantity);
            unit_price.get_or_insert(stored.unit_price);
            if matches!(self.updated_at, ActiveValue::NotSet) {
                self.updated_at = ActiveValue::Unchanged(stored.updated_at);
            }
        }

        if let (Some(q), Some(p)) = (quantity, unit_price) {
            self.subtotal = Set(round2(f64::from(q) * p));
        }

        if !insert {
            self.updated_at = Set(super::next_updated_at(&self.updated_at));
        }
        Ok(self)
    }
}
