//! Entity module - Contains all SeaORM entity definitions for the database.
//! The four fact tables (customers, products, orders, order items) are the source of truth;
//! the two rollup tables hold materialized snapshots and `rollup_state` tracks their versions.

pub mod customer;
pub mod monthly_rollup;
pub mod order;
pub mod order_item;
pub mod product;
pub mod rollup_state;
pub mod weekly_category_rollup;

use sea_orm::prelude::DateTime;
use sea_orm::{ActiveValue, DbErr};

// Re-export specific types to avoid conflicts
pub use customer::{Column as CustomerColumn, Entity as Customer, Model as CustomerModel};
pub use monthly_rollup::{
    Column as MonthlyRollupColumn, Entity as MonthlyRollup, Model as MonthlyRollupModel,
};
pub use order::{Column as OrderColumn, Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Column as OrderItemColumn, Entity as OrderItem, Model as OrderItemModel};
pub use product::{Column as ProductColumn, Entity as Product, Model as ProductModel};
pub use rollup_state::{
    Column as RollupStateColumn, Entity as RollupState, Model as RollupStateModel,
};
pub use weekly_category_rollup::{
    Column as WeeklyCategoryRollupColumn, Entity as WeeklyCategoryRollup,
    Model as WeeklyCategoryRollupModel,
};

/// Marks a `DbErr::Custom` raised by an entity hook that refused to save a row.
pub(crate) const INVARIANT_PREFIX: &str = "invariant violated: ";

/// Error for a row that would break a fact store invariant.
pub(crate) fn invariant_violation(message: impl std::fmt::Display) -> DbErr {
    DbErr::Custom(format!("{INVARIANT_PREFIX}{message}"))
}

/// Next `updated_at` value for a row being saved. Never moves backwards, even if the
/// stored timestamp is ahead of the local clock.
pub(crate) fn next_updated_at(current: &ActiveValue<DateTime>) -> DateTime {
    let now = chrono::Utc::now().naive_utc();
    match current {
        ActiveValue::Set(prev) | ActiveValue::Unchanged(prev) => now.max(*prev),
        ActiveValue::NotSet => now,
    }
}

/// Reads the value out of an active field if it carries one.
pub(crate) fn active_value<T: Clone + Into<sea_orm::Value>>(value: &ActiveValue<T>) -> Option<T> {
    match value {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(v.clone()),
        ActiveValue::NotSet => None,
    }
}
