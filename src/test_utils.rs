//! Shared test utilities for the sales rollup engine.
//!
//! This module provides helper functions for setting up in-memory test databases and
//! creating fact rows with sensible defaults.

use crate::{
    core::{
        customer::{self, NewCustomer},
        order::{self, NewOrderItem},
        product,
    },
    entities::{self, OrderStatus},
    errors::Result,
};
use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with all fact tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Midnight-based timestamp at the given hour. Panics on an invalid date.
#[allow(clippy::unwrap_used)]
pub fn ymd_hms(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// Creates a test customer.
///
/// # Defaults
/// * name: "Test Customer"
/// * country, city: None
pub async fn create_test_customer(
    db: &DatabaseConnection,
    email: &str,
) -> Result<entities::customer::Model> {
    customer::create_customer(
        db,
        NewCustomer {
            first_name: "Test".to_string(),
            last_name: "Customer".to_string(),
            email: email.to_string(),
            country: None,
            city: None,
        },
    )
    .await
}

/// Creates a test product with the given price and category.
pub async fn create_test_product(
    db: &DatabaseConnection,
    title: &str,
    price: f64,
    category: &str,
) -> Result<entities::product::Model> {
    product::create_product(db, title, price, category).await
}

/// Creates an order whose lines are `(product_id, quantity)` pairs sold at list price.
pub async fn create_test_order(
    db: &DatabaseConnection,
    customer_id: i64,
    order_date: NaiveDateTime,
    status: OrderStatus,
    lines: &[(i64, i32)],
) -> Result<(entities::order::Model, Vec<entities::order_item::Model>)> {
    let items: Vec<NewOrderItem> = lines
        .iter()
        .map(|&(product_id, quantity)| NewOrderItem::at_list_price(product_id, quantity))
        .collect();
    order::create_order_with_items(db, customer_id, order_date, status, &items).await
}

/// Sets up a test database with one customer and one product.
/// Returns (db, customer, product) for order-related tests.
pub async fn setup_with_product(
    category: &str,
    price: f64,
) -> Result<(
    DatabaseConnection,
    entities::customer::Model,
    entities::product::Model,
)> {
    let db = setup_test_db().await?;
    let customer = create_test_customer(&db, "buyer@example.com").await?;
    let product = create_test_product(&db, "Test Product", price, category).await?;
    Ok((db, customer, product))
}

/// Rows created by [`seed_scenario_a`].
pub struct ScenarioA {
    /// Three customers; only the first two have orders
    pub customers: Vec<entities::customer::Model>,
    /// "Books" product listed at 10.00
    pub cheap_book: entities::product::Model,
    /// "Books" product listed at 20.00, not yet sold
    pub expensive_book: entities::product::Model,
}

/// Three customers, two "Books" products at 10.00 and 20.00, and two completed orders
/// in the ISO week of Monday 2024-03-04: 1 x 10.00 and 2 x 20.00. Both lines sell the
/// cheaper title, the second at a 20.00 unit price.
pub async fn seed_scenario_a() -> Result<(DatabaseConnection, ScenarioA)> {
    let db = setup_test_db().await?;
    let mut customers = Vec::with_capacity(3);
    for email in ["ann@example.com", "bob@example.com", "cy@example.com"] {
        customers.push(create_test_customer(&db, email).await?);
    }
    let cheap_book = create_test_product(&db, "Rust in Action", 10.0, "Books").await?;
    let expensive_book = create_test_product(&db, "Zero to Production", 20.0, "Books").await?;

    order::create_order_with_items(
        &db,
        customers[0].id,
        ymd_hms(2024, 3, 4, 10),
        OrderStatus::Completed,
        &[NewOrderItem::at_list_price(cheap_book.id, 1)],
    )
    .await?;
    order::create_order_with_items(
        &db,
        customers[1].id,
        ymd_hms(2024, 3, 6, 11),
        OrderStatus::Completed,
        &[NewOrderItem {
            product_id: cheap_book.id,
            quantity: 2,
            unit_price: Some(20.0),
        }],
    )
    .await?;

    Ok((
        db,
        ScenarioA {
            customers,
            cheap_book,
            expensive_book,
        },
    ))
}
