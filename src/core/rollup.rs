//! Rollup definitions - pure transforms from a [`FactSnapshot`] to derived result sets.
//!
//! Every revenue-bearing rollup only looks at `completed` orders. Customer analytics is
//! the exception: every customer appears, with empty aggregates when they have no
//! completed orders. Money and ratio outputs are rounded to two decimals here, at
//! aggregation time. Groups with no qualifying orders produce no row at all.
//!
//! Each function returns its rows in the rollup's canonical order so readers never
//! need to re-sort.

use crate::core::money::{round1, round2, safe_avg};
use crate::core::snapshot::{FactSnapshot, RollupRows};
use crate::entities::OrderStatus;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Names of the rollups computed on every read.
pub const ON_DEMAND_ROLLUPS: [&str; 4] = [
    "daily_sales",
    "category_analysis",
    "customer_analytics",
    "order_details",
];

/// Completed-order sales for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySalesRow {
    pub sale_date: NaiveDate,
    pub orders_count: i64,
    pub revenue: f64,
    pub avg_order_value: f64,
    pub unique_customers: i64,
}

/// Completed-order sales for one product category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryAnalysisRow {
    pub category: String,
    pub orders_count: i64,
    pub items_sold: i64,
    pub revenue: f64,
    pub avg_product_price: f64,
    pub unique_customers: i64,
    /// Percentage of the result set's total revenue, one decimal
    pub revenue_share: f64,
}

/// Lifetime value of one customer. Aggregates are `None` without completed orders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerAnalyticsRow {
    pub customer_id: i64,
    pub customer_name: String,
    pub email: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub total_orders: i64,
    pub total_spent: Option<f64>,
    pub avg_order_value: Option<f64>,
    pub last_order_date: Option<NaiveDateTime>,
}

/// One order with its customer and a readable product list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetailRow {
    pub order_id: i64,
    pub customer_name: String,
    pub order_date: NaiveDateTime,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub items_count: i64,
    /// `"<title> (x<qty>)"` entries joined by `", "`
    pub products: String,
}

/// Completed-order sales for one (ISO week, category) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyCategoryRow {
    pub week_start: NaiveDate,
    pub category: String,
    pub orders_in_category: i64,
    pub unique_customers_in_category: i64,
    pub revenue_in_category: f64,
    pub items_sold_in_category: i64,
    pub avg_order_value_in_category: f64,
    pub unique_products_in_category: i64,
}

/// Completed-order sales for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRow {
    pub month_start: NaiveDate,
    pub year: i32,
    pub month: i32,
    pub total_orders: i64,
    pub unique_customers: i64,
    pub total_revenue: f64,
    pub total_items_sold: i64,
    pub avg_order_value: f64,
}

/// Monday of the ISO week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date - chrono::Days::new(offset)
}

/// First day of the month containing `date`.
#[must_use]
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn len_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Distinct orders, customers and products plus running sums for one group.
#[derive(Default)]
struct GroupTotals {
    orders: HashSet<i64>,
    customers: HashSet<i64>,
    products: HashSet<i64>,
    revenue: f64,
    items: i64,
    price_sum: f64,
    lines: u64,
}

impl GroupTotals {
    fn orders(&self) -> i64 {
        count(self.orders.len())
    }

    fn revenue(&self) -> f64 {
        round2(self.revenue)
    }

    fn avg_order_value(&self) -> f64 {
        safe_avg(self.revenue, len_u64(self.orders.len()))
    }
}

/// Daily sales, newest day first.
#[must_use]
pub fn daily_sales(facts: &FactSnapshot) -> RollupRows<DailySalesRow> {
    let mut days: BTreeMap<NaiveDate, GroupTotals> = BTreeMap::new();
    for order in facts.completed_orders() {
        let day = days.entry(order.order_date.date()).or_default();
        day.orders.insert(order.id);
        day.customers.insert(order.customer_id);
        day.revenue += order.total_amount;
    }

    days.into_iter()
        .rev()
        .map(|(sale_date, t)| DailySalesRow {
            sale_date,
            orders_count: t.orders(),
            revenue: t.revenue(),
            avg_order_value: t.avg_order_value(),
            unique_customers: count(t.customers.len()),
        })
        .collect::<Vec<_>>()
        .into()
}

/// Category analysis, highest revenue first.
#[must_use]
pub fn category_analysis(facts: &FactSnapshot) -> RollupRows<CategoryAnalysisRow> {
    let mut categories: HashMap<&str, GroupTotals> = HashMap::new();
    for line in facts.completed_lines() {
        let group = categories.entry(line.product.category.as_str()).or_default();
        group.orders.insert(line.order.id);
        group.customers.insert(line.order.customer_id);
        group.revenue += line.item.subtotal;
        group.items += i64::from(line.item.quantity);
        group.price_sum += line.product.price;
        group.lines += 1;
    }

    let grand_total: f64 = categories.values().map(GroupTotals::revenue).sum();

    let mut rows: Vec<CategoryAnalysisRow> = categories
        .into_iter()
        .map(|(category, t)| {
            let revenue = t.revenue();
            let revenue_share = if grand_total > 0.0 {
                round1(revenue / grand_total * 100.0)
            } else {
                0.0
            };
            CategoryAnalysisRow {
                category: category.to_string(),
                orders_count: t.orders(),
                items_sold: t.items,
                revenue,
                avg_product_price: safe_avg(t.price_sum, t.lines),
                unique_customers: count(t.customers.len()),
                revenue_share,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.category.cmp(&b.category))
    });
    rows.into()
}

/// Customer analytics for every customer, biggest spenders first, customers without
/// completed orders last.
#[must_use]
pub fn customer_analytics(facts: &FactSnapshot) -> RollupRows<CustomerAnalyticsRow> {
    let mut per_customer: HashMap<i64, (u64, f64, Option<NaiveDateTime>)> = HashMap::new();
    for order in facts.completed_orders() {
        let entry = per_customer.entry(order.customer_id).or_default();
        entry.0 += 1;
        entry.1 += order.total_amount;
        entry.2 = entry.2.max(Some(order.order_date));
    }

    let mut rows: Vec<CustomerAnalyticsRow> = facts
        .customers
        .iter()
        .map(|c| {
            let (orders, spent, last) = per_customer.get(&c.id).copied().unwrap_or_default();
            let has_orders = orders > 0;
            CustomerAnalyticsRow {
                customer_id: c.id,
                customer_name: c.full_name(),
                email: c.email.clone(),
                city: c.city.clone(),
                country: c.country.clone(),
                total_orders: i64::try_from(orders).unwrap_or(i64::MAX),
                total_spent: has_orders.then(|| round2(spent)),
                avg_order_value: has_orders.then(|| safe_avg(spent, orders)),
                last_order_date: last,
            }
        })
        .collect();

    rows.sort_by(|a, b| match (a.total_spent, b.total_spent) {
        (Some(x), Some(y)) => y.total_cmp(&x).then_with(|| a.customer_id.cmp(&b.customer_id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.customer_id.cmp(&b.customer_id),
    });
    rows.into()
}

/// Order details for orders of any status that have at least one resolvable item,
/// newest first.
#[must_use]
pub fn order_details(facts: &FactSnapshot) -> RollupRows<OrderDetailRow> {
    let customers = facts.customers_by_id();
    let products = facts.products_by_id();

    let mut lines_by_order: HashMap<i64, Vec<String>> = HashMap::new();
    for item in &facts.items {
        if let Some(product) = products.get(&item.product_id) {
            lines_by_order
                .entry(item.order_id)
                .or_default()
                .push(format!("{} (x{})", product.title, item.quantity));
        }
    }

    let mut rows: Vec<OrderDetailRow> = facts
        .orders
        .iter()
        .filter_map(|order| {
            let customer = customers.get(&order.customer_id)?;
            let lines = lines_by_order.get(&order.id)?;
            Some(OrderDetailRow {
                order_id: order.id,
                customer_name: customer.full_name(),
                order_date: order.order_date,
                total_amount: order.total_amount,
                status: order.status,
                items_count: count(lines.len()),
                products: lines.join(", "),
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.order_date
            .cmp(&a.order_date)
            .then_with(|| b.order_id.cmp(&a.order_id))
    });
    rows.into()
}

/// Weekly category rollup: newest week first, then highest revenue, then category name.
#[must_use]
pub fn weekly_category_rollup(facts: &FactSnapshot) -> RollupRows<WeeklyCategoryRow> {
    let mut groups: BTreeMap<(NaiveDate, &str), GroupTotals> = BTreeMap::new();
    for line in facts.completed_lines() {
        let key = (
            week_start(line.order.order_date.date()),
            line.product.category.as_str(),
        );
        let group = groups.entry(key).or_default();
        group.orders.insert(line.order.id);
        group.customers.insert(line.order.customer_id);
        group.products.insert(line.product.id);
        group.revenue += line.item.subtotal;
        group.items += i64::from(line.item.quantity);
    }

    let mut rows: Vec<WeeklyCategoryRow> = groups
        .into_iter()
        .map(|((week_start, category), t)| WeeklyCategoryRow {
            week_start,
            category: category.to_string(),
            orders_in_category: t.orders(),
            unique_customers_in_category: count(t.customers.len()),
            revenue_in_category: t.revenue(),
            items_sold_in_category: t.items,
            avg_order_value_in_category: t.avg_order_value(),
            unique_products_in_category: count(t.products.len()),
        })
        .collect();

    sort_weekly(&mut rows);
    rows.into()
}

/// Canonical weekly order; shared with the materialized read path.
pub(crate) fn sort_weekly(rows: &mut [WeeklyCategoryRow]) {
    rows.sort_by(|a, b| {
        b.week_start
            .cmp(&a.week_start)
            .then_with(|| b.revenue_in_category.total_cmp(&a.revenue_in_category))
            .then_with(|| a.category.cmp(&b.category))
    });
}

/// Monthly rollup, newest month first.
///
/// Revenue counts each order's `total_amount` once, however many items it has.
#[must_use]
pub fn monthly_rollup(facts: &FactSnapshot) -> RollupRows<MonthlyRow> {
    let mut months: BTreeMap<NaiveDate, GroupTotals> = BTreeMap::new();
    for line in facts.completed_lines() {
        let month = months
            .entry(month_start(line.order.order_date.date()))
            .or_default();
        if month.orders.insert(line.order.id) {
            month.revenue += line.order.total_amount;
        }
        month.customers.insert(line.order.customer_id);
        month.items += i64::from(line.item.quantity);
    }

    months
        .into_iter()
        .rev()
        .map(|(month_start, t)| MonthlyRow {
            month_start,
            year: month_start.year(),
            month: i32::try_from(month_start.month()).unwrap_or_default(),
            total_orders: t.orders(),
            unique_customers: count(t.customers.len()),
            total_revenue: t.revenue(),
            total_items_sold: t.items,
            avg_order_value: t.avg_order_value(),
        })
        .collect::<Vec<_>>()
        .into()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::errors::Result;
    use crate::test_utils::*;

    #[test]
    fn test_week_start_is_monday() {
        // 2024-03-07 is a Thursday
        let thursday = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(week_start(thursday), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());

        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(week_start(monday), monday);

        // Sunday belongs to the week that started six days earlier
        let sunday = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(week_start(sunday), monday);
    }

    #[test]
    fn test_month_start() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(month_start(date), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[tokio::test]
    async fn test_scenario_a_single_weekly_row() -> Result<()> {
        let (db, _) = seed_scenario_a().await?;
        let facts = FactSnapshot::load(&db).await?;

        let weekly = weekly_category_rollup(&facts);
        assert_eq!(weekly.len(), 1);
        let row = &weekly.as_slice()[0];
        assert_eq!(row.week_start, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(row.category, "Books");
        assert_eq!(row.orders_in_category, 2);
        assert_eq!(row.items_sold_in_category, 3);
        assert_eq!(row.revenue_in_category, 50.0);
        assert_eq!(row.avg_order_value_in_category, 25.0);
        assert_eq!(row.unique_products_in_category, 1);
        assert_eq!(row.unique_customers_in_category, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_scenario_b_cancelled_order_contributes_nothing() -> Result<()> {
        let (db, fixture) = seed_scenario_a().await?;
        let (cancelled, _) = create_test_order(
            &db,
            fixture.customers[2].id,
            ymd_hms(2024, 3, 6, 12),
            OrderStatus::Cancelled,
            &[(fixture.expensive_book.id, 5)],
        )
        .await?;
        assert_eq!(cancelled.total_amount, 100.0);

        let facts = FactSnapshot::load(&db).await?;
        let weekly = weekly_category_rollup(&facts);
        assert_eq!(weekly.len(), 1);
        assert_eq!(weekly.as_slice()[0].revenue_in_category, 50.0);

        let categories = category_analysis(&facts);
        assert_eq!(categories.as_slice()[0].revenue, 50.0);

        let monthly = monthly_rollup(&facts);
        assert_eq!(monthly.as_slice()[0].total_revenue, 50.0);

        let daily: f64 = daily_sales(&facts).iter().map(|d| d.revenue).sum();
        assert_eq!(daily, 50.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_weekly_rollup_is_sparse_and_ordered() -> Result<()> {
        let db = setup_test_db().await?;
        let customer = create_test_customer(&db, "sparse@example.com").await?;
        let book = create_test_product(&db, "Novel", 10.0, "Books").await?;
        let ball = create_test_product(&db, "Ball", 30.0, "Sports").await?;

        // Week of 2024-03-04: Books and Sports. Week of 2024-03-11: Sports only.
        create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 3, 5, 8),
            OrderStatus::Completed,
            &[(book.id, 1)],
        )
        .await?;
        create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 3, 6, 8),
            OrderStatus::Completed,
            &[(ball.id, 1)],
        )
        .await?;
        create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 3, 12, 8),
            OrderStatus::Completed,
            &[(ball.id, 2)],
        )
        .await?;
        // A processing order in the second week must not create a Books row there.
        create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 3, 13, 8),
            OrderStatus::Processing,
            &[(book.id, 1)],
        )
        .await?;

        let facts = FactSnapshot::load(&db).await?;
        let weekly = weekly_category_rollup(&facts);
        let keys: Vec<(NaiveDate, &str)> = weekly
            .iter()
            .map(|r| (r.week_start, r.category.as_str()))
            .collect();

        let w1 = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let w2 = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        assert_eq!(keys, vec![(w2, "Sports"), (w1, "Sports"), (w1, "Books")]);
        Ok(())
    }

    #[tokio::test]
    async fn test_category_analysis_shares_and_prices() -> Result<()> {
        let db = setup_test_db().await?;
        let customer = create_test_customer(&db, "cat@example.com").await?;
        let cheap = create_test_product(&db, "Paperback", 10.0, "Books").await?;
        let pricey = create_test_product(&db, "Hardcover", 30.0, "Books").await?;
        let ball = create_test_product(&db, "Ball", 20.0, "Sports").await?;

        create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 5, 1, 8),
            OrderStatus::Completed,
            &[(cheap.id, 2), (pricey.id, 1)],
        )
        .await?;
        create_test_order(
            &db,
            customer.id,
            ymd_hms(2024, 5, 2, 8),
            OrderStatus::Completed,
            &[(ball.id, 1)],
        )
        .await?;

        let facts = FactSnapshot::load(&db).await?;
        let rows = category_analysis(&facts);
        assert_eq!(rows.len(), 2);

        let books = &rows.as_slice()[0];
        assert_eq!(books.category, "Books");
        assert_eq!(books.revenue, 50.0);
        assert_eq!(books.items_sold, 3);
        assert_eq!(books.orders_count, 1);
        assert_eq!(books.avg_product_price, 20.0);
        assert_eq!(books.revenue_share, 71.4);

        let sports = &rows.as_slice()[1];
        assert_eq!(sports.revenue_share, 28.6);
        Ok(())
    }

    #[tokio::test]
    async fn test_customer_analytics_includes_customers_without_orders() -> Result<()> {
        let (db, fixture) = seed_scenario_a().await?;
        let facts = FactSnapshot::load(&db).await?;

        let rows = customer_analytics(&facts);
        assert_eq!(rows.len(), 3);

        let top = &rows.as_slice()[0];
        assert_eq!(top.customer_id, fixture.customers[1].id);
        assert_eq!(top.total_spent, Some(40.0));
        assert_eq!(top.avg_order_value, Some(40.0));
        assert_eq!(top.total_orders, 1);

        let idle = &rows.as_slice()[2];
        assert_eq!(idle.customer_id, fixture.customers[2].id);
        assert_eq!(idle.total_orders, 0);
        assert!(idle.total_spent.is_none());
        assert!(idle.avg_order_value.is_none());
        assert!(idle.last_order_date.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_order_details_lists_products() -> Result<()> {
        let (db, fixture) = seed_scenario_a().await?;
        let facts = FactSnapshot::load(&db).await?;

        let rows = order_details(&facts);
        assert_eq!(rows.len(), 2);
        let newest = &rows.as_slice()[0];
        assert_eq!(newest.products, format!("{} (x2)", fixture.cheap_book.title));
        assert_eq!(newest.items_count, 1);
        assert_eq!(newest.status, OrderStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_daily_and_monthly_rollups() -> Result<()> {
        let (db, fixture) = seed_scenario_a().await?;
        create_test_order(
            &db,
            fixture.customers[0].id,
            ymd_hms(2024, 4, 2, 9),
            OrderStatus::Completed,
            &[(fixture.cheap_book.id, 3), (fixture.expensive_book.id, 1)],
        )
        .await?;

        let facts = FactSnapshot::load(&db).await?;

        let daily = daily_sales(&facts);
        assert_eq!(daily.len(), 3);
        assert_eq!(daily.as_slice()[0].sale_date, NaiveDate::from_ymd_opt(2024, 4, 2).unwrap());
        assert_eq!(daily.as_slice()[0].revenue, 50.0);

        let monthly = monthly_rollup(&facts);
        assert_eq!(monthly.len(), 2);
        let april = &monthly.as_slice()[0];
        assert_eq!((april.year, april.month), (2024, 4));
        assert_eq!(april.total_orders, 1);
        // Two items on one order must not double the order's revenue
        assert_eq!(april.total_revenue, 50.0);
        assert_eq!(april.total_items_sold, 4);

        let march = &monthly.as_slice()[1];
        assert_eq!(march.month_start, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(march.total_orders, 2);
        assert_eq!(march.total_revenue, 50.0);
        assert_eq!(march.avg_order_value, 25.0);
        Ok(())
    }

    #[test]
    fn test_empty_store_yields_empty_rollups() {
        let facts = FactSnapshot::default();
        assert!(daily_sales(&facts).is_empty());
        assert!(category_analysis(&facts).is_empty());
        assert!(customer_analytics(&facts).is_empty());
        assert!(order_details(&facts).is_empty());
        assert!(weekly_category_rollup(&facts).is_empty());
        assert!(monthly_rollup(&facts).is_empty());
    }
}
