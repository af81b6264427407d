//! Point-in-time view of the fact store that every rollup is computed from.

use crate::{
    entities::{
        Customer, Order, OrderItem, OrderStatus, Product, customer, order, order_item, product,
    },
    errors::Result,
};
use sea_orm::{ConnectionTrait, EntityTrait, QueryOrder, TransactionTrait};
use std::collections::HashMap;
use std::sync::Arc;

/// All four fact relations, read inside a single transaction.
#[derive(Debug, Clone, Default)]
pub struct FactSnapshot {
    /// Every customer, by id
    pub customers: Vec<customer::Model>,
    /// Every product, by id
    pub products: Vec<product::Model>,
    /// Every order regardless of status, by id
    pub orders: Vec<order::Model>,
    /// Every order item, by id
    pub items: Vec<order_item::Model>,
}

/// A line item of a completed order, joined with its order and product.
#[derive(Debug, Clone, Copy)]
pub struct CompletedLine<'a> {
    /// The owning order
    pub order: &'a order::Model,
    /// The line itself
    pub item: &'a order_item::Model,
    /// The product sold
    pub product: &'a product::Model,
}

impl FactSnapshot {
    /// Reads the whole fact store in one transaction so all relations agree with each other.
    pub async fn load<C>(db: &C) -> Result<Self>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let txn = db.begin().await?;
        let customers = Customer::find()
            .order_by_asc(customer::Column::Id)
            .all(&txn)
            .await?;
        let products = Product::find()
            .order_by_asc(product::Column::Id)
            .all(&txn)
            .await?;
        let orders = Order::find()
            .order_by_asc(order::Column::Id)
            .all(&txn)
            .await?;
        let items = OrderItem::find()
            .order_by_asc(order_item::Column::Id)
            .all(&txn)
            .await?;
        txn.commit().await?;

        Ok(Self {
            customers,
            products,
            orders,
            items,
        })
    }

    /// Orders with status `completed`.
    pub fn completed_orders(&self) -> impl Iterator<Item = &order::Model> {
        self.orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
    }

    /// Items of completed orders joined with their order and product.
    ///
    /// Items whose order or product cannot be resolved are left out, like an inner join.
    #[must_use]
    pub fn completed_lines(&self) -> Vec<CompletedLine<'_>> {
        let orders = self.orders_by_id();
        let products = self.products_by_id();
        self.items
            .iter()
            .filter_map(|item| {
                let order = *orders.get(&item.order_id)?;
                let product = *products.get(&item.product_id)?;
                (order.status == OrderStatus::Completed).then_some(CompletedLine {
                    order,
                    item,
                    product,
                })
            })
            .collect()
    }

    /// Orders keyed by id.
    #[must_use]
    pub fn orders_by_id(&self) -> HashMap<i64, &order::Model> {
        self.orders.iter().map(|o| (o.id, o)).collect()
    }

    /// Products keyed by id.
    #[must_use]
    pub fn products_by_id(&self) -> HashMap<i64, &product::Model> {
        self.products.iter().map(|p| (p.id, p)).collect()
    }

    /// Customers keyed by id.
    #[must_use]
    pub fn customers_by_id(&self) -> HashMap<i64, &customer::Model> {
        self.customers.iter().map(|c| (c.id, c)).collect()
    }
}

/// An ordered, finite result set that can be iterated any number of times.
///
/// Cloning is cheap: clones share the same rows.
#[derive(Debug, PartialEq)]
pub struct RollupRows<T> {
    rows: Arc<[T]>,
}

impl<T> RollupRows<T> {
    /// Iterates the rows in their canonical order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    /// Rows as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T> Clone for RollupRows<T> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
        }
    }
}

impl<T> From<Vec<T>> for RollupRows<T> {
    fn from(rows: Vec<T>) -> Self {
        Self { rows: rows.into() }
    }
}

impl<'a, T> IntoIterator for &'a RollupRows<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
