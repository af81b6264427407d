//! Order business logic - Orders and the line items they own.
//!
//! Every item mutation recomputes the owning order's `total_amount` inside the same
//! database transaction, so an order's total always equals the sum of its item
//! subtotals. Operations are all-or-nothing: when called on a transaction they run in
//! a savepoint, otherwise in a fresh transaction.

use crate::{
    core::money::round2,
    entities::{Customer, Order, OrderItem, OrderStatus, Product, order, order_item},
    errors::{Error, Result},
};
use sea_orm::{PaginatorTrait, QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::debug;

/// One line to add to an order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewOrderItem {
    /// Product being sold
    pub product_id: i64,
    /// Units sold, must be positive
    pub quantity: i32,
    /// Price per unit; defaults to the product's current list price
    pub unit_price: Option<f64>,
}

impl NewOrderItem {
    /// A line sold at the product's current list price.
    #[must_use]
    pub const fn at_list_price(product_id: i64, quantity: i32) -> Self {
        Self {
            product_id,
            quantity,
            unit_price: None,
        }
    }
}

fn validate_quantity(quantity: i32) -> Result<()> {
    if quantity <= 0 {
        return Err(Error::integrity(format!(
            "order item quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

fn validate_unit_price(unit_price: f64) -> Result<f64> {
    if !unit_price.is_finite() || unit_price < 0.0 {
        return Err(Error::integrity(format!(
            "order item unit price must be non-negative, got {unit_price}"
        )));
    }
    Ok(round2(unit_price))
}

async fn find_order<C>(db: &C, order_id: i64) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    Order::find_by_id(order_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "order",
            id: order_id,
        })
}

async fn find_item<C>(db: &C, item_id: i64) -> Result<order_item::Model>
where
    C: ConnectionTrait,
{
    OrderItem::find_by_id(item_id)
        .one(db)
        .await?
        .ok_or(Error::NotFound {
            entity: "order item",
            id: item_id,
        })
}

/// Inserts one line without touching the order total. Callers recompute it.
async fn insert_item<C>(db: &C, order_id: i64, item: NewOrderItem) -> Result<order_item::Model>
where
    C: ConnectionTrait,
{
    validate_quantity(item.quantity)?;

    let product = Product::find_by_id(item.product_id)
        .one(db)
        .await?
        .ok_or_else(|| {
            Error::integrity(format!(
                "order item references missing product {}",
                item.product_id
            ))
        })?;
    let unit_price = validate_unit_price(item.unit_price.unwrap_or(product.price))?;

    let now = chrono::Utc::now().naive_utc();
    let line = order_item::ActiveModel {
        order_id: Set(order_id),
        product_id: Set(product.id),
        quantity: Set(item.quantity),
        unit_price: Set(unit_price),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    line.insert(db).await.map_err(Into::into)
}

/// Recomputes `total_amount` as the rounded sum of the order's item subtotals.
pub async fn recalculate_order_total<C>(db: &C, order_id: i64) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    let order = find_order(db, order_id).await?;
    let items = get_items_for_order(db, order_id).await?;
    let total = round2(items.iter().map(|i| i.subtotal).sum());

    if (order.total_amount - total).abs() < f64::EPSILON {
        return Ok(order);
    }

    let mut active: order::ActiveModel = order.into();
    active.total_amount = Set(total);
    active.update(db).await.map_err(Into::into)
}

/// Creates an empty order for an existing customer. The total starts at 0.00.
///
/// # Errors
/// Returns `Error::IntegrityViolation` if the customer does not exist.
pub async fn create_order<C>(
    db: &C,
    customer_id: i64,
    order_date: DateTime,
    status: OrderStatus,
) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    if Customer::find_by_id(customer_id).one(db).await?.is_none() {
        return Err(Error::integrity(format!(
            "order references missing customer {customer_id}"
        )));
    }

    let now = chrono::Utc::now().naive_utc();
    let order = order::ActiveModel {
        customer_id: Set(customer_id),
        order_date: Set(order_date),
        total_amount: Set(0.0),
        status: Set(status),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let model = order.insert(db).await?;
    debug!("Created {} order {} for customer {}", status, model.id, customer_id);
    Ok(model)
}

/// Creates an order together with its items in one transaction.
///
/// Nothing is persisted if any line is invalid.
pub async fn create_order_with_items<C>(
    db: &C,
    customer_id: i64,
    order_date: DateTime,
    status: OrderStatus,
    items: &[NewOrderItem],
) -> Result<(order::Model, Vec<order_item::Model>)>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    let order = create_order(&txn, customer_id, order_date, status).await?;
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        lines.push(insert_item(&txn, order.id, *item).await?);
    }
    let order = recalculate_order_total(&txn, order.id).await?;

    txn.commit().await?;
    Ok((order, lines))
}

/// Adds a line to an existing order and recomputes its total.
///
/// # Errors
/// Returns `Error::IntegrityViolation` for a non-positive quantity, a negative unit price
/// or a missing product, and `Error::NotFound` if the order does not exist.
pub async fn add_order_item<C>(
    db: &C,
    order_id: i64,
    item: NewOrderItem,
) -> Result<order_item::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    find_order(&txn, order_id).await?;
    let line = insert_item(&txn, order_id, item).await?;
    recalculate_order_total(&txn, order_id).await?;

    txn.commit().await?;
    Ok(line)
}

/// Changes the quantity of a line; its subtotal and the order total follow.
pub async fn update_order_item_quantity<C>(
    db: &C,
    item_id: i64,
    quantity: i32,
) -> Result<order_item::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    validate_quantity(quantity)?;
    let txn = db.begin().await?;

    let line = find_item(&txn, item_id).await?;
    let order_id = line.order_id;
    let mut active: order_item::ActiveModel = line.into();
    active.quantity = Set(quantity);
    let line = active.update(&txn).await?;
    recalculate_order_total(&txn, order_id).await?;

    txn.commit().await?;
    Ok(line)
}

/// Removes a line from its order and recomputes the total.
pub async fn remove_order_item<C>(db: &C, item_id: i64) -> Result<()>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    let line = find_item(&txn, item_id).await?;
    let order_id = line.order_id;
    line.delete(&txn).await?;
    recalculate_order_total(&txn, order_id).await?;

    txn.commit().await?;
    Ok(())
}

/// Moves an order to another status.
pub async fn set_order_status<C>(db: &C, order_id: i64, status: OrderStatus) -> Result<order::Model>
where
    C: ConnectionTrait,
{
    let mut active: order::ActiveModel = find_order(db, order_id).await?.into();
    active.status = Set(status);
    active.update(db).await.map_err(Into::into)
}

/// Deletes an order and every item it owns.
pub async fn delete_order<C>(db: &C, order_id: i64) -> Result<()>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    let order = find_order(&txn, order_id).await?;
    OrderItem::delete_many()
        .filter(order_item::Column::OrderId.eq(order_id))
        .exec(&txn)
        .await?;
    order.delete(&txn).await?;

    txn.commit().await?;
    debug!("Deleted order {} with its items", order_id);
    Ok(())
}

/// Retrieves a specific order by its unique ID.
pub async fn get_order_by_id<C>(db: &C, order_id: i64) -> Result<Option<order::Model>>
where
    C: ConnectionTrait,
{
    Order::find_by_id(order_id).one(db).await.map_err(Into::into)
}

/// Retrieves the lines of an order in insertion order.
pub async fn get_items_for_order<C>(db: &C, order_id: i64) -> Result<Vec<order_item::Model>>
where
    C: ConnectionTrait,
{
    OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Number of orders in the store.
pub async fn count_orders<C>(db: &C) -> Result<u64>
where
    C: ConnectionTrait,
{
    Order::find().count(db).await.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{ActiveModelTrait, ActiveValue};

    #[tokio::test]
    async fn test_zero_quantity_rejected_before_touching_store() -> Result<()> {
        let db = setup_test_db().await?;
        // No item 1 exists, so only the up-front check can produce this error.
        let result = update_order_item_quantity(&db, 1, 0).await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_direct_insert_with_zero_quantity_is_integrity_violation() -> Result<()> {
        let (db, customer, product) = setup_with_product("Books", 10.0).await?;
        let order = create_order(&db, customer.id, ymd_hms(2024, 3, 4, 9), OrderStatus::Completed)
            .await?;
        let now = chrono::Utc::now().naive_utc();

        let result = order_item::ActiveModel {
            order_id: Set(order.id),
            product_id: Set(product.id),
            quantity: Set(0),
            unit_price: Set(10.0),
            subtotal: Set(0.0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db)
        .await
        .map_err(Error::from);

        match result {
            Err(Error::IntegrityViolation { message }) => assert!(message.contains("quantity")),
            other => panic!("expected IntegrityViolation, got {other:?}"),
        }
        assert_eq!(OrderItem::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_item_update_recomputes_subtotal() -> Result<()> {
        let (db, customer, product) = setup_with_product("Books", 10.0).await?;
        let (_, lines) = create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 3, 4, 9),
            OrderStatus::Completed,
            &[(product.id, 2)],
        )
        .await?;
        assert_eq!(lines[0].subtotal, 20.0);

        // Only the quantity is sent; the unit price comes from the stored row.
        let saved = order_item::ActiveModel {
            id: ActiveValue::Unchanged(lines[0].id),
            quantity: Set(5),
            ..Default::default()
        }
        .update(&db)
        .await?;
        assert_eq!(saved.quantity, 5);
        assert_eq!(saved.unit_price, 10.0);
        assert_eq!(saved.subtotal, 50.0);

        let saved = order_item::ActiveModel {
            id: ActiveValue::Unchanged(lines[0].id),
            unit_price: Set(3.5),
            ..Default::default()
        }
        .update(&db)
        .await?;
        assert_eq!(saved.subtotal, 17.5);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_item_update_rejects_bad_input() -> Result<()> {
        let (db, customer, product) = setup_with_product("Books", 10.0).await?;
        let (_, lines) = create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 3, 4, 9),
            OrderStatus::Completed,
            &[(product.id, 2)],
        )
        .await?;

        let result = order_item::ActiveModel {
            id: ActiveValue::Unchanged(lines[0].id),
            quantity: Set(-1),
            ..Default::default()
        }
        .update(&db)
        .await
        .map_err(Error::from);
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));

        let stored = OrderItem::find_by_id(lines[0].id).one(&db).await?.unwrap();
        assert_eq!(stored.quantity, 2);
        assert_eq!(stored.subtotal, 20.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_quantity_item_not_persisted() -> Result<()> {
        let (db, customer, product) = setup_with_product("Books", 10.0).await?;
        let order = create_order(&db, customer.id, ymd_hms(2024, 3, 4, 9), OrderStatus::Completed)
            .await?;

        let result =
            add_order_item(&db, order.id, NewOrderItem::at_list_price(product.id, 0)).await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));

        assert!(get_items_for_order(&db, order.id).await?.is_empty());
        assert_eq!(get_order_by_id(&db, order.id).await?.unwrap().total_amount, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_order_for_missing_customer_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let result = create_order(&db, 42, ymd_hms(2024, 1, 1, 0), OrderStatus::Processing).await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));
        assert_eq!(count_orders(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_item_for_missing_product_rolls_back_whole_order() -> Result<()> {
        let (db, customer, product) = setup_with_product("Books", 10.0).await?;

        let result = create_order_with_items(
            &db,
            customer.id,
            ymd_hms(2024, 3, 4, 9),
            OrderStatus::Completed,
            &[
                NewOrderItem::at_list_price(product.id, 1),
                NewOrderItem::at_list_price(9999, 1),
            ],
        )
        .await;

        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));
        assert_eq!(count_orders(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_subtotal_and_total_follow_items() -> Result<()> {
        let (db, customer, product) = setup_with_product("Books", 20.0).await?;

        let (order, lines) = create_order_with_items(
            &db,
            customer.id,
            ymd_hms(2024, 3, 4, 9),
            OrderStatus::Completed,
            &[
                NewOrderItem::at_list_price(product.id, 2),
                NewOrderItem {
                    product_id: product.id,
                    quantity: 3,
                    unit_price: Some(9.99),
                },
            ],
        )
        .await?;

        assert_eq!(lines[0].subtotal, 40.0);
        assert_eq!(lines[1].subtotal, 29.97);
        assert_eq!(order.total_amount, 69.97);

        let line = update_order_item_quantity(&db, lines[0].id, 5).await?;
        assert_eq!(line.subtotal, 100.0);
        let order = get_order_by_id(&db, order.id).await?.unwrap();
        assert_eq!(order.total_amount, 129.97);

        remove_order_item(&db, lines[1].id).await?;
        let order = get_order_by_id(&db, order.id).await?.unwrap();
        assert_eq!(order.total_amount, 100.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_subtotal_is_read_only() -> Result<()> {
        let (db, customer, product) = setup_with_product("Books", 10.0).await?;
        let (_, lines) = create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 3, 4, 9),
            OrderStatus::Completed,
            &[(product.id, 2)],
        )
        .await?;

        // A caller trying to write the subtotal directly gets it recomputed.
        let mut active: order_item::ActiveModel = lines[0].clone().into();
        active.subtotal = Set(1_000.0);
        let saved = active.update(&db).await?;
        assert_eq!(saved.subtotal, 20.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_order_cascades_items() -> Result<()> {
        let (db, customer, product) = setup_with_product("Books", 10.0).await?;
        let (order, _) = create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 3, 4, 9),
            OrderStatus::Cancelled,
            &[(product.id, 1), (product.id, 4)],
        )
        .await?;

        delete_order(&db, order.id).await?;

        assert!(get_order_by_id(&db, order.id).await?.is_none());
        assert_eq!(OrderItem::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_set_order_status() -> Result<()> {
        let (db, customer, _) = setup_with_product("Books", 10.0).await?;
        let order = create_order(&db, customer.id, ymd_hms(2024, 3, 4, 9), OrderStatus::Processing)
            .await?;

        let order = set_order_status(&db, order.id, OrderStatus::Completed).await?;
        assert_eq!(order.status, OrderStatus::Completed);
        Ok(())
    }
}
