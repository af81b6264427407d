//! Data seeder - fills the fact store with a synthetic but referentially consistent
//! sales workload.
//!
//! The whole run happens in one transaction: either every customer, product, order and
//! item lands, or nothing does. Seeding assumes it is the only writer.

use crate::{
    core::{
        customer::{NewCustomer, count_customers, create_customer},
        order::{NewOrderItem, count_orders, create_order_with_items},
        product::create_product,
    },
    entities::{Customer, Order, OrderItem, OrderStatus, Product},
    errors::{Error, Result},
};
use chrono::{Duration, Utc};
use fake::{
    Fake,
    faker::{
        address::en::{CityName, CountryName},
        company::en::CatchPhrase,
        name::en::{FirstName, LastName},
    },
};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, PaginatorTrait,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Statuses are drawn from this list, so completed orders are twice as likely as
/// processing or cancelled ones.
const STATUS_WEIGHTS: [OrderStatus; 4] = [
    OrderStatus::Completed,
    OrderStatus::Completed,
    OrderStatus::Processing,
    OrderStatus::Cancelled,
];

/// Store counts above which [`has_existing_data`] reports existing data.
const EXISTING_DATA_THRESHOLD: u64 = 10;

/// Size and shape of a synthetic workload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SeedPlan {
    /// Customers to create
    pub customers: usize,
    /// Products to create
    pub products: usize,
    /// Orders to create
    pub orders: usize,
    /// Orders are dated within this many days before now
    pub lookback_days: u32,
    /// Product categories to draw from
    pub categories: Vec<String>,
    /// Fixed RNG seed for a reproducible workload
    pub rng_seed: Option<u64>,
}

impl Default for SeedPlan {
    fn default() -> Self {
        Self {
            customers: 100,
            products: 50,
            orders: 200,
            lookback_days: 90,
            categories: ["Electronics", "Books", "Clothing", "Home & Garden", "Sports"]
                .map(String::from)
                .to_vec(),
            rng_seed: None,
        }
    }
}

impl SeedPlan {
    fn validate(&self) -> Result<()> {
        if self.products > 0 && self.categories.is_empty() {
            return Err(Error::Config {
                message: "seeding products needs at least one category".to_string(),
            });
        }
        if self.orders > 0 && (self.customers == 0 || self.products == 0) {
            return Err(Error::Config {
                message: "seeding orders needs at least one customer and one product"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Row counts per fact relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FactCounts {
    pub customers: u64,
    pub products: u64,
    pub orders: u64,
    pub order_items: u64,
}

/// Counts the rows of every fact relation.
pub async fn fact_counts(db: &DatabaseConnection) -> Result<FactCounts> {
    Ok(FactCounts {
        customers: Customer::find().count(db).await?,
        products: Product::find().count(db).await?,
        orders: Order::find().count(db).await?,
        order_items: OrderItem::find().count(db).await?,
    })
}

/// Whether the store already holds a realistic amount of data.
pub async fn has_existing_data(db: &DatabaseConnection) -> Result<bool> {
    let customers = count_customers(db).await?;
    let orders = count_orders(db).await?;
    Ok(customers > EXISTING_DATA_THRESHOLD && orders > EXISTING_DATA_THRESHOLD)
}

/// Deletes every fact row, children first, in one transaction.
pub async fn clear_all_data(db: &DatabaseConnection) -> Result<()> {
    let txn = db.begin().await?;
    let cleared = clear_facts(&txn).await?;
    txn.commit().await?;
    info!(
        "Cleared fact store: {} customers, {} products, {} orders, {} items",
        cleared.customers, cleared.products, cleared.orders, cleared.order_items
    );
    Ok(())
}

/// Deletes every fact row, children first, and returns how many went.
async fn clear_facts<C>(db: &C) -> Result<FactCounts>
where
    C: ConnectionTrait,
{
    let order_items = OrderItem::delete_many().exec(db).await?.rows_affected;
    let orders = Order::delete_many().exec(db).await?.rows_affected;
    let products = Product::delete_many().exec(db).await?.rows_affected;
    let customers = Customer::delete_many().exec(db).await?.rows_affected;
    Ok(FactCounts {
        customers,
        products,
        orders,
        order_items,
    })
}

fn email_for(first: &str, last: &str, index: usize) -> String {
    let local: String = format!("{first}.{last}")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();
    format!("{local}.{index}@example.com").to_lowercase()
}

/// Seeds the store according to `plan` and returns what was inserted.
///
/// # Errors
/// Returns `Error::Config` for an unusable plan. Any store error rolls the whole run back.
pub async fn seed_sample_data(db: &DatabaseConnection, plan: &SeedPlan) -> Result<FactCounts> {
    plan.validate()?;
    let txn = db.begin().await?;
    let counts = seed_into(&txn, plan).await?;
    txn.commit().await?;
    info!(
        "Seeded {} customers, {} products, {} orders with {} items",
        counts.customers, counts.products, counts.orders, counts.order_items
    );
    Ok(counts)
}

/// Replaces every fact row with a fresh workload in one transaction.
///
/// If seeding fails the clear is rolled back too, so the previous data survives.
///
/// # Errors
/// Same as [`seed_sample_data`].
pub async fn reseed_sample_data(db: &DatabaseConnection, plan: &SeedPlan) -> Result<FactCounts> {
    plan.validate()?;
    let txn = db.begin().await?;
    let cleared = clear_facts(&txn).await?;
    let counts = seed_into(&txn, plan).await?;
    txn.commit().await?;
    info!(
        "Replaced {} customers and {} orders with {} customers, {} products, {} orders",
        cleared.customers, cleared.orders, counts.customers, counts.products, counts.orders
    );
    Ok(counts)
}

async fn seed_into(txn: &DatabaseTransaction, plan: &SeedPlan) -> Result<FactCounts> {
    let mut rng = plan
        .rng_seed
        .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

    info!(
        "Seeding {} customers, {} products, {} orders",
        plan.customers, plan.products, plan.orders
    );

    let mut customer_ids = Vec::with_capacity(plan.customers);
    for index in 1..=plan.customers {
        let first_name: String = FirstName().fake_with_rng(&mut rng);
        let last_name: String = LastName().fake_with_rng(&mut rng);
        let customer = create_customer(
            txn,
            NewCustomer {
                email: email_for(&first_name, &last_name, index),
                first_name,
                last_name,
                country: Some(CountryName().fake_with_rng(&mut rng)),
                city: Some(CityName().fake_with_rng(&mut rng)),
            },
        )
        .await?;
        customer_ids.push(customer.id);
    }
    debug!("Seeded {} customers", customer_ids.len());

    let mut product_ids = Vec::with_capacity(plan.products);
    for _ in 0..plan.products {
        let title: String = CatchPhrase().fake_with_rng(&mut rng);
        let price = rng.random_range(10.0..=1000.0);
        let category = plan
            .categories
            .choose(&mut rng)
            .ok_or_else(|| Error::Config {
                message: "no categories to seed products with".to_string(),
            })?;
        let product = create_product(txn, &title, price, category).await?;
        product_ids.push(product.id);
    }
    debug!("Seeded {} products", product_ids.len());

    let now = Utc::now().naive_utc();
    let window = i64::from(plan.lookback_days) * 24 * 60 * 60;
    let mut item_count = 0u64;
    for n in 1..=plan.orders {
        let (Some(&customer_id), Some(&status)) =
            (customer_ids.choose(&mut rng), STATUS_WEIGHTS.choose(&mut rng))
        else {
            break;
        };
        let order_date = now - Duration::seconds(rng.random_range(0..=window));

        let lines: Vec<NewOrderItem> = (0..rng.random_range(1..=4))
            .filter_map(|_| {
                let product_id = *product_ids.choose(&mut rng)?;
                Some(NewOrderItem::at_list_price(product_id, rng.random_range(1..=3)))
            })
            .collect();

        let (_, items) =
            create_order_with_items(txn, customer_id, order_date, status, &lines).await?;
        item_count += items.len() as u64;

        if n % 50 == 0 {
            debug!("Seeded {}/{} orders", n, plan.orders);
        }
    }

    Ok(FactCounts {
        customers: customer_ids.len() as u64,
        products: product_ids.len() as u64,
        orders: plan.orders as u64,
        order_items: item_count,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::materialize::MaterializationEngine;
    use crate::core::money::round2;
    use crate::core::snapshot::FactSnapshot;
    use crate::core::verify::{CheckKind, VerifierThresholds, verify};
    use crate::test_utils::*;
    use std::collections::HashMap;

    fn small_plan(seed: u64) -> SeedPlan {
        SeedPlan {
            customers: 12,
            products: 8,
            orders: 40,
            lookback_days: 30,
            rng_seed: Some(seed),
            ..SeedPlan::default()
        }
    }

    #[tokio::test]
    async fn test_seed_counts_and_shape() -> Result<()> {
        let db = setup_test_db().await?;
        let seeded = seed_sample_data(&db, &small_plan(7)).await?;

        let counts = fact_counts(&db).await?;
        assert_eq!(counts, seeded);
        assert_eq!(counts.customers, 12);
        assert_eq!(counts.products, 8);
        assert_eq!(counts.orders, 40);
        assert!((40..=160).contains(&counts.order_items));

        let facts = FactSnapshot::load(&db).await?;
        let mut per_order: HashMap<i64, (usize, f64)> = HashMap::new();
        for item in &facts.items {
            assert!((1..=3).contains(&item.quantity));
            let entry = per_order.entry(item.order_id).or_default();
            entry.0 += 1;
            entry.1 += item.subtotal;
        }
        for order in &facts.orders {
            let (lines, total) = per_order[&order.id];
            assert!((1..=4).contains(&lines));
            assert_eq!(order.total_amount, round2(total));
        }
        for product in &facts.products {
            assert!((10.0..=1000.0).contains(&product.price));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_seeded_data_passes_verification() -> Result<()> {
        let db = setup_test_db().await?;
        seed_sample_data(&db, &small_plan(11)).await?;

        let engine = MaterializationEngine::new(db);
        engine.build_all().await?;
        engine.refresh_all().await?;

        let report = verify(&engine, &VerifierThresholds::default()).await?;
        assert_eq!(report.violations_of(CheckKind::NonNegativity).count(), 0);
        assert_eq!(report.violations_of(CheckKind::SubtotalIntegrity).count(), 0);
        assert!(report.passed(), "{:?}", report.violations);
        Ok(())
    }

    #[tokio::test]
    async fn test_same_seed_same_workload() -> Result<()> {
        let first = setup_test_db().await?;
        let second = setup_test_db().await?;
        seed_sample_data(&first, &small_plan(3)).await?;
        seed_sample_data(&second, &small_plan(3)).await?;

        let a = FactSnapshot::load(&first).await?;
        let b = FactSnapshot::load(&second).await?;
        let emails = |f: &FactSnapshot| {
            f.customers
                .iter()
                .map(|c| c.email.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(emails(&a), emails(&b));
        let totals = |f: &FactSnapshot| {
            f.orders
                .iter()
                .map(|o| (o.status, o.total_amount))
                .collect::<Vec<_>>()
        };
        assert_eq!(totals(&a), totals(&b));
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_data_and_clear() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(!has_existing_data(&db).await?);

        seed_sample_data(&db, &small_plan(5)).await?;
        assert!(has_existing_data(&db).await?);

        clear_all_data(&db).await?;
        assert_eq!(fact_counts(&db).await?, FactCounts::default());
        assert!(!has_existing_data(&db).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_reseed_replaces_data() -> Result<()> {
        let db = setup_test_db().await?;
        seed_sample_data(&db, &small_plan(5)).await?;

        let plan = SeedPlan {
            customers: 3,
            products: 2,
            orders: 4,
            ..small_plan(6)
        };
        let counts = reseed_sample_data(&db, &plan).await?;
        assert_eq!(fact_counts(&db).await?, counts);
        assert_eq!(counts.customers, 3);
        assert_eq!(counts.orders, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_reseed_keeps_existing_data() -> Result<()> {
        let db = setup_test_db().await?;
        seed_sample_data(&db, &small_plan(5)).await?;
        let before = fact_counts(&db).await?;

        // Blank categories pass plan validation but every product insert fails.
        let plan = SeedPlan {
            categories: vec!["   ".to_string()],
            ..small_plan(6)
        };
        let result = reseed_sample_data(&db, &plan).await;
        assert!(matches!(result, Err(Error::IntegrityViolation { .. })));

        assert_eq!(fact_counts(&db).await?, before);
        assert!(has_existing_data(&db).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_unusable_plan_is_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let plan = SeedPlan {
            customers: 0,
            rng_seed: Some(1),
            ..SeedPlan::default()
        };
        let result = seed_sample_data(&db, &plan).await;
        assert!(matches!(result, Err(Error::Config { .. })));
        assert_eq!(fact_counts(&db).await?, FactCounts::default());
        Ok(())
    }
}
