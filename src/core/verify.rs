//! Consistency verifier - cross-checks the fact store against every rollup.
//!
//! Each check runs to completion and records every offending row; no check stops the
//! others. A failed check is data, not an error: [`verify`] only returns `Err` when
//! the store itself cannot be read. Callers that want failures to be fatal use
//! [`VerificationReport::into_result`].

use crate::{
    core::{
        materialize::MaterializationEngine,
        money::has_at_most_decimals,
        rollup::{self, WeeklyCategoryRow},
        snapshot::{FactSnapshot, RollupRows},
    },
    entities::OrderStatus,
    errors::{Error, Result},
};
use chrono::{Datelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

/// Tolerances for the numeric checks.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VerifierThresholds {
    /// Allowed drift between independently aggregated revenue totals
    pub revenue_tolerance: f64,
    /// Allowed drift between a stored average and `revenue / orders`
    pub avg_order_tolerance: f64,
    /// Allowed drift between a subtotal and `quantity * unit_price`
    pub subtotal_tolerance: f64,
    /// Maximum decimal digits on money and ratio fields
    pub max_decimal_places: u32,
}

impl Default for VerifierThresholds {
    fn default() -> Self {
        Self {
            revenue_tolerance: 1.0,
            avg_order_tolerance: 1.0,
            subtotal_tolerance: 0.01,
            max_decimal_places: 2,
        }
    }
}

/// The independent checks run by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CheckKind {
    /// Weekly rows are well formed
    Shape,
    /// Weekly averages match revenue over orders
    DerivedMath,
    /// Weekly items sold cover the distinct products sold
    LogicalBound,
    /// Money and ratio fields carry no excess precision
    Rounding,
    /// Completed-order, category and weekly revenue totals agree
    RevenueAgreement,
    /// Item subtotals match quantity times unit price
    SubtotalIntegrity,
    /// Prices, quantities and every rollup count or revenue are non-negative
    NonNegativity,
    /// Every reference in the fact store resolves
    ReferentialIntegrity,
}

impl CheckKind {
    /// Every check, in reporting order.
    pub const ALL: [Self; 8] = [
        Self::Shape,
        Self::DerivedMath,
        Self::LogicalBound,
        Self::Rounding,
        Self::RevenueAgreement,
        Self::SubtotalIntegrity,
        Self::NonNegativity,
        Self::ReferentialIntegrity,
    ];
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shape => "shape",
            Self::DerivedMath => "derived math",
            Self::LogicalBound => "logical bound",
            Self::Rounding => "rounding",
            Self::RevenueAgreement => "revenue agreement",
            Self::SubtotalIntegrity => "subtotal integrity",
            Self::NonNegativity => "non-negativity",
            Self::ReferentialIntegrity => "referential integrity",
        };
        f.write_str(name)
    }
}

/// One broken rule on one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Check that found it
    pub check: CheckKind,
    /// The rule that was broken, with the offending values
    pub rule: String,
    /// The offending row
    pub row: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} :: {}", self.check, self.rule, self.row)
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    /// Which check
    pub check: CheckKind,
    /// Whether it found nothing
    pub passed: bool,
    /// How many violations it found
    pub violations: usize,
}

/// Revenue totals from the three independent aggregation paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RevenueTotals {
    /// Sum of `total_amount` over completed orders
    pub completed_orders: f64,
    /// Sum of category analysis revenue
    pub category_analysis: f64,
    /// Sum of weekly category revenue
    pub weekly_category: f64,
}

/// Everything one verifier run found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    /// Pass or fail per check, in [`CheckKind::ALL`] order
    pub checks: Vec<CheckResult>,
    /// Every violation found
    pub violations: Vec<Violation>,
    /// Revenue totals that were compared
    pub totals: RevenueTotals,
}

impl VerificationReport {
    /// Whether every check passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations found by one check.
    pub fn violations_of(&self, check: CheckKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.check == check)
    }

    /// Returns the report if it passed, [`Error::AggregationInconsistency`] otherwise.
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(Error::AggregationInconsistency {
                violations: self.violations.len(),
            })
        }
    }
}

fn exceeds(diff: f64, tolerance: f64) -> bool {
    diff.is_nan() || diff.abs() > tolerance
}

struct Findings<'t> {
    thresholds: &'t VerifierThresholds,
    violations: Vec<Violation>,
}

impl Findings<'_> {
    fn fail(&mut self, check: CheckKind, rule: String, row: &impl fmt::Debug) {
        self.violations.push(Violation {
            check,
            rule,
            row: format!("{row:?}"),
        });
    }

    fn non_negative(&mut self, field: &str, value: f64, row: &impl fmt::Debug) {
        if value.is_nan() || value < 0.0 {
            self.fail(
                CheckKind::NonNegativity,
                format!("{field} must be >= 0, got {value}"),
                row,
            );
        }
    }

    fn rounded(&mut self, field: &str, value: f64, row: &impl fmt::Debug) {
        let places = self.thresholds.max_decimal_places;
        if !has_at_most_decimals(value, places) {
            self.fail(
                CheckKind::Rounding,
                format!("{field} = {value} has more than {places} decimal places"),
                row,
            );
        }
    }

    fn within(&mut self, check: CheckKind, what: &str, a: f64, b: f64, tolerance: f64) {
        if exceeds(a - b, tolerance) {
            self.fail(
                check,
                format!("{what}: {a} vs {b} differ by more than {tolerance}"),
                &(a, b),
            );
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn weekly_shape(findings: &mut Findings<'_>, row: &WeeklyCategoryRow) {
    if row.category.trim().is_empty() {
        findings.fail(CheckKind::Shape, "category must not be empty".to_string(), row);
    }
    if row.week_start.weekday() != Weekday::Mon {
        findings.fail(
            CheckKind::Shape,
            format!("week_start {} is not a Monday", row.week_start),
            row,
        );
    }
    let counts = [
        ("orders_in_category", row.orders_in_category),
        ("unique_customers_in_category", row.unique_customers_in_category),
        ("items_sold_in_category", row.items_sold_in_category),
        ("unique_products_in_category", row.unique_products_in_category),
    ];
    for (field, value) in counts {
        if value < 0 {
            findings.fail(CheckKind::Shape, format!("{field} must be >= 0, got {value}"), row);
        }
        findings.non_negative(field, value as f64, row);
    }
    let money = [
        ("revenue_in_category", row.revenue_in_category),
        ("avg_order_value_in_category", row.avg_order_value_in_category),
    ];
    for (field, value) in money {
        if !value.is_finite() || value < 0.0 {
            findings.fail(
                CheckKind::Shape,
                format!("{field} must be a non-negative number, got {value}"),
                row,
            );
        }
        findings.non_negative(field, value, row);
        findings.rounded(field, value, row);
    }

    if row.orders_in_category > 0 {
        let expected = row.revenue_in_category / row.orders_in_category as f64;
        let tolerance = findings.thresholds.avg_order_tolerance;
        if exceeds(row.avg_order_value_in_category - expected, tolerance) {
            findings.fail(
                CheckKind::DerivedMath,
                format!(
                    "avg_order_value_in_category {} != revenue / orders {expected:.4} \
                     (tolerance {tolerance})",
                    row.avg_order_value_in_category
                ),
                row,
            );
        }
    }

    if row.items_sold_in_category > 0
        && row.items_sold_in_category < row.unique_products_in_category
    {
        findings.fail(
            CheckKind::LogicalBound,
            format!(
                "items_sold_in_category {} < unique_products_in_category {}",
                row.items_sold_in_category, row.unique_products_in_category
            ),
            row,
        );
    }
}

fn fact_checks(findings: &mut Findings<'_>, facts: &FactSnapshot) {
    for product in &facts.products {
        findings.non_negative("product price", product.price, product);
        findings.rounded("product price", product.price, product);
    }

    for order in &facts.orders {
        findings.rounded("order total_amount", order.total_amount, order);
        findings.non_negative("order total_amount", order.total_amount, order);
    }

    let tolerance = findings.thresholds.subtotal_tolerance;
    for item in &facts.items {
        if item.quantity <= 0 {
            findings.fail(
                CheckKind::NonNegativity,
                format!("quantity must be > 0, got {}", item.quantity),
                item,
            );
        }
        findings.non_negative("unit_price", item.unit_price, item);
        findings.rounded("subtotal", item.subtotal, item);

        let expected = f64::from(item.quantity) * item.unit_price;
        if exceeds(item.subtotal - expected, tolerance) {
            findings.fail(
                CheckKind::SubtotalIntegrity,
                format!(
                    "subtotal {} != quantity {} x unit_price {} (tolerance {tolerance})",
                    item.subtotal, item.quantity, item.unit_price
                ),
                item,
            );
        }
    }

    let customers: HashSet<i64> = facts.customers.iter().map(|c| c.id).collect();
    let orders: HashSet<i64> = facts.orders.iter().map(|o| o.id).collect();
    let products: HashSet<i64> = facts.products.iter().map(|p| p.id).collect();
    for order in &facts.orders {
        if !customers.contains(&order.customer_id) {
            findings.fail(
                CheckKind::ReferentialIntegrity,
                format!("order references missing customer {}", order.customer_id),
                order,
            );
        }
    }
    for item in &facts.items {
        if !orders.contains(&item.order_id) {
            findings.fail(
                CheckKind::ReferentialIntegrity,
                format!("item references missing order {}", item.order_id),
                item,
            );
        }
        if !products.contains(&item.product_id) {
            findings.fail(
                CheckKind::ReferentialIntegrity,
                format!("item references missing product {}", item.product_id),
                item,
            );
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn on_demand_checks(findings: &mut Findings<'_>, facts: &FactSnapshot) -> f64 {
    for row in &rollup::daily_sales(facts) {
        findings.non_negative("orders_count", row.orders_count as f64, row);
        findings.non_negative("unique_customers", row.unique_customers as f64, row);
        for (field, value) in [("revenue", row.revenue), ("avg_order_value", row.avg_order_value)] {
            findings.non_negative(field, value, row);
            findings.rounded(field, value, row);
        }
    }

    let categories = rollup::category_analysis(facts);
    for row in &categories {
        findings.non_negative("orders_count", row.orders_count as f64, row);
        findings.non_negative("items_sold", row.items_sold as f64, row);
        findings.non_negative("unique_customers", row.unique_customers as f64, row);
        for (field, value) in [
            ("revenue", row.revenue),
            ("avg_product_price", row.avg_product_price),
            ("revenue_share", row.revenue_share),
        ] {
            findings.non_negative(field, value, row);
            findings.rounded(field, value, row);
        }
    }

    for row in &rollup::customer_analytics(facts) {
        findings.non_negative("total_orders", row.total_orders as f64, row);
        for (field, value) in [
            ("total_spent", row.total_spent),
            ("avg_order_value", row.avg_order_value),
        ] {
            if let Some(value) = value {
                findings.non_negative(field, value, row);
                findings.rounded(field, value, row);
            }
        }
    }

    for row in &rollup::monthly_rollup(facts) {
        findings.non_negative("total_orders", row.total_orders as f64, row);
        findings.non_negative("unique_customers", row.unique_customers as f64, row);
        findings.non_negative("total_items_sold", row.total_items_sold as f64, row);
        for (field, value) in [
            ("total_revenue", row.total_revenue),
            ("avg_order_value", row.avg_order_value),
        ] {
            findings.non_negative(field, value, row);
            findings.rounded(field, value, row);
        }
    }

    categories.iter().map(|c| c.revenue).sum()
}

/// Runs every check over a fact snapshot and a weekly category result set.
#[must_use]
pub fn verify_snapshot(
    facts: &FactSnapshot,
    weekly: &RollupRows<WeeklyCategoryRow>,
    thresholds: &VerifierThresholds,
) -> VerificationReport {
    let mut findings = Findings {
        thresholds,
        violations: Vec::new(),
    };

    for row in weekly {
        weekly_shape(&mut findings, row);
    }
    fact_checks(&mut findings, facts);
    let category_total = on_demand_checks(&mut findings, facts);

    let totals = RevenueTotals {
        completed_orders: facts
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Completed)
            .map(|o| o.total_amount)
            .sum(),
        category_analysis: category_total,
        weekly_category: weekly.iter().map(|r| r.revenue_in_category).sum(),
    };
    let tolerance = thresholds.revenue_tolerance;
    findings.within(
        CheckKind::RevenueAgreement,
        "completed order revenue vs category analysis revenue",
        totals.completed_orders,
        totals.category_analysis,
        tolerance,
    );
    findings.within(
        CheckKind::RevenueAgreement,
        "completed order revenue vs weekly category revenue",
        totals.completed_orders,
        totals.weekly_category,
        tolerance,
    );
    findings.within(
        CheckKind::RevenueAgreement,
        "category analysis revenue vs weekly category revenue",
        totals.category_analysis,
        totals.weekly_category,
        tolerance,
    );

    let violations = findings.violations;
    let checks = CheckKind::ALL
        .iter()
        .map(|&check| {
            let count = violations.iter().filter(|v| v.check == check).count();
            CheckResult {
                check,
                passed: count == 0,
                violations: count,
            }
        })
        .collect();

    VerificationReport {
        checks,
        violations,
        totals,
    }
}

/// Verifies the persisted weekly category snapshot against a fresh read of the facts.
///
/// Check failures are reported, never returned as `Err`.
pub async fn verify(
    engine: &MaterializationEngine,
    thresholds: &VerifierThresholds,
) -> Result<VerificationReport> {
    let weekly = engine.weekly_category_rows().await?;
    let facts = FactSnapshot::load(engine.connection()).await?;
    let report = verify_snapshot(&facts, &weekly, thresholds);

    for check in &report.checks {
        if !check.passed {
            warn!("Check '{}' failed with {} violation(s)", check.check, check.violations);
        }
    }
    if report.passed() {
        info!(
            "All {} consistency checks passed (revenue {:.2})",
            report.checks.len(),
            report.totals.completed_orders
        );
    }
    Ok(report)
}
