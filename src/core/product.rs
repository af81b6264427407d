//! Product business logic - Handles all product-related operations.
//!
//! This module provides functions for creating, retrieving, repricing and deleting
//! catalog products. Prices are validated to be finite and non-negative and are stored
//! rounded to two decimals. A product that still appears on any order line cannot be
//! deleted.

use crate::{
    core::money::round2,
    entities::{OrderItem, Product, order_item, product},
    errors::{Error, Result},
};
use sea_orm::{PaginatorTrait, QueryOrder, Set, prelude::*};

fn validate_price(price: f64) -> Result<f64> {
    if !price.is_finite() || price < 0.0 {
        return Err(Error::integrity(format!(
            "product price must be a non-negative amount, got {price}"
        )));
    }
    Ok(round2(price))
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::integrity(format!("product {field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

/// Retrieves a specific product by its unique ID.
pub async fn get_product_by_id<C>(db: &C, product_id: i64) -> Result<Option<product::Model>>
where
    C: ConnectionTrait,
{
    Product::find_by_id(product_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves all products of a category, ordered by title.
pub async fn get_products_by_category<C>(db: &C, category: &str) -> Result<Vec<product::Model>>
where
    C: ConnectionTrait,
{
    Product::find()
        .filter(product::Column::Category.eq(category))
        .order_by_asc(product::Column::Title)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates a new product with the specified parameters, performing input validation.
///
/// # Errors
/// Returns `Error::IntegrityViolation` if:
/// - The title or category is empty or whitespace-only
/// - The price is negative or not finite (NaN, infinity)
pub async fn create_product<C>(
    db: &C,
    title: &str,
    price: f64,
    category: &str,
) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    let title = required("title", title)?;
    let category = required("category", category)?;
    let price = validate_price(price)?;

    let now = chrono::Utc::now().naive_utc();
    let product = product::ActiveModel {
        title: Set(title),
        price: Set(price),
        category: Set(category),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    product.insert(db).await.map_err(Into::into)
}

/// Changes a product's list price. Existing order lines keep the unit price they were sold at.
///
/// # Errors
/// Returns an error if the price is invalid or the product does not exist.
pub async fn update_product_price<C>(
    db: &C,
    product_id: i64,
    new_price: f64,
) -> Result<product::Model>
where
    C: ConnectionTrait,
{
    let new_price = validate_price(new_price)?;

    let mut product: product::ActiveModel = get_product_by_id(db, product_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "product",
            id: product_id,
        })?
        .into();

    product.price = Set(new_price);
    product.update(db).await.map_err(Into::into)
}

/// Deletes a product that no order line references.
///
/// # Errors
/// Returns `Error::IntegrityViolation` if any order item still references the product,
/// or `Error::NotFound` if it does not exist.
pub async fn delete_product<C>(db: &C, product_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let product = get_product_by_id(db, product_id)
        .await?
        .ok_or(Error::NotFound {
            entity: "product",
            id: product_id,
        })?;

    let references = OrderItem::find()
        .filter(order_item::Column::ProductId.eq(product_id))
        .count(db)
        .await?;
    if references > 0 {
        return Err(Error::integrity(format!(
            "product {product_id} is referenced by {references} order item(s)"
        )));
    }

    product.delete(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::entities::OrderStatus;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_product_validation() -> Result<()> {
        let db = setup_test_db().await?;

        let result = create_product(&db, "", 10.0, "Books").await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));

        let result = create_product(&db, "Novel", 10.0, "   ").await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));

        let result = create_product(&db, "Novel", -10.0, "Books").await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));

        let result = create_product(&db, "Novel", f64::NAN, "Books").await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));

        let result = create_product(&db, "Novel", f64::INFINITY, "Books").await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));

        assert_eq!(Product::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_product_rounds_price() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_product(&db, "Lamp", 19.999, "Home & Garden").await?;
        assert_eq!(product.price, 20.0);
        assert_eq!(product.category, "Home & Garden");
        Ok(())
    }

    #[tokio::test]
    async fn test_update_product_price() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Ball", 12.5, "Sports").await?;

        let updated = update_product_price(&db, product.id, 15.25).await?;
        assert_eq!(updated.price, 15.25);
        assert!(updated.updated_at >= product.updated_at);

        let result = update_product_price(&db, product.id, -1.0).await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_unreferenced_product() -> Result<()> {
        let db = setup_test_db().await?;
        let product = create_test_product(&db, "Unused", 5.0, "Books").await?;

        delete_product(&db, product.id).await?;
        assert!(get_product_by_id(&db, product.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_referenced_product_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let customer = create_test_customer(&db, "buyer@example.com").await?;
        let product = create_test_product(&db, "Popular", 10.0, "Books").await?;
        create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 3, 4, 10),
            OrderStatus::Completed,
            &[(product.id, 2)],
        )
        .await?;

        let result = delete_product(&db, product.id).await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));
        assert!(get_product_by_id(&db, product.id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_products_by_category() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_product(&db, "Zeta", 1.0, "Books").await?;
        create_test_product(&db, "Alpha", 2.0, "Books").await?;
        create_test_product(&db, "Racket", 3.0, "Sports").await?;

        let books = get_products_by_category(&db, "Books").await?;
        let titles: Vec<&str> = books.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Zeta"]);
        Ok(())
    }
}
