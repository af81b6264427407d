//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Fact tables and the rollup bookkeeping table are generated from the entity
//! definitions with `Schema::create_table_from_entity`, so the schema always matches the
//! Rust structs. Materialized rollup tables are not created here; the materialization
//! engine owns their lifecycle.

use crate::entities::{
    Customer, Order, OrderColumn, OrderItem, OrderItemColumn, Product, ProductColumn, RollupState,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/sales_analytics.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
///
/// This function looks for `DATABASE_URL` in the environment and falls back to
/// a default local `SQLite` file if not found.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// An unreachable store surfaces as `Error::ConnectivityFailure`.
pub async fn create_connection() -> Result<DatabaseConnection> {
    connect(&get_database_url()).await
}

/// Establishes a connection to the given database URL.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to database at {}", database_url);
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates a table for `entity` unless it already exists.
pub(crate) async fn create_table_if_missing<C, E>(db: &C, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;
    Ok(())
}

fn fact_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .if_not_exists()
            .name("idx_orders_date")
            .table(Order)
            .col(OrderColumn::OrderDate)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_orders_customer_id")
            .table(Order)
            .col(OrderColumn::CustomerId)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_orders_status")
            .table(Order)
            .col(OrderColumn::Status)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_order_items_order_id")
            .table(OrderItem)
            .col(OrderItemColumn::OrderId)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_order_items_product_id")
            .table(OrderItem)
            .col(OrderItemColumn::ProductId)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_products_category")
            .table(Product)
            .col(ProductColumn::Category)
            .to_owned(),
    ]
}

/// Creates the fact tables, their lookup indexes and the rollup state table.
///
/// Safe to call on every startup: every statement is `IF NOT EXISTS`.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    create_table_if_missing(db, Customer).await?;
    create_table_if_missing(db, Product).await?;
    create_table_if_missing(db, Order).await?;
    create_table_if_missing(db, OrderItem).await?;
    create_table_if_missing(db, RollupState).await?;

    let builder = db.get_database_backend();
    for index in fact_indexes() {
        db.execute(builder.build(&index)).await?;
    }

    info!("Fact store tables and indexes ensured.");
    Ok(())
}
