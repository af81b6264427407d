use dotenvy::dotenv;
use sales_rollups::{
    config::{self, database},
    core::{
        materialize::MaterializationEngine,
        seed::{fact_counts, has_existing_data, reseed_sample_data, seed_sample_data},
        verify::verify,
    },
    errors::Result,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Weekly rows shown in the closing summary.
const SUMMARY_WEEKS: usize = 5;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load settings
    let app_config = config::load_default_config()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;

    // 4. Connect and make sure the fact tables exist
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to the store: {}", e))?;
    database::create_tables(&db).await?;

    // 5. Seed when the store is empty or a fresh workload was requested
    let seeding = &app_config.seeding;
    if seeding.regenerate {
        // Clearing and reseeding share one transaction, so a failed run keeps the old data
        reseed_sample_data(&db, &seeding.plan)
            .await
            .inspect_err(|e| error!("Regenerating sample data failed: {}", e))?;
    } else if !has_existing_data(&db).await? {
        seed_sample_data(&db, &seeding.plan)
            .await
            .inspect_err(|e| error!("Seeding failed: {}", e))?;
    } else {
        let counts = fact_counts(&db).await?;
        info!(
            "Using existing data: {} customers, {} products, {} orders, {} items",
            counts.customers, counts.products, counts.orders, counts.order_items
        );
    }

    // 6. Build and refresh the materialized rollups
    let engine = MaterializationEngine::new(db);
    engine.build_all().await?;
    for outcome in engine.refresh_all().await? {
        info!(
            "{} refreshed ({}) to version {} with {} rows",
            outcome.rollup, outcome.mode, outcome.version, outcome.rows
        );
    }

    let metadata = engine.metadata().await?;
    info!("On-demand rollups: {}", metadata.on_demand.join(", "));
    for status in &metadata.materialized {
        info!(
            "{}: table={} index={} version={} rows={}",
            status.rollup,
            status.table_exists,
            status.index_exists,
            status.active_version,
            status.row_count
        );
    }

    // 7. Verify consistency; failures are reported, not fatal
    let report = verify(&engine, &app_config.verification).await?;
    for violation in &report.violations {
        warn!("{}", violation);
    }
    info!(
        "Revenue: completed orders {:.2}, categories {:.2}, weekly rollup {:.2}",
        report.totals.completed_orders,
        report.totals.category_analysis,
        report.totals.weekly_category
    );

    // 8. Short summary
    for row in engine.weekly_category_rows().await?.iter().take(SUMMARY_WEEKS) {
        info!(
            "Week of {} | {:<15} | orders {:>3} | revenue {:>10.2} | avg {:>8.2}",
            row.week_start,
            row.category,
            row.orders_in_category,
            row.revenue_in_category,
            row.avg_order_value_in_category
        );
    }
    for row in &engine.monthly_rows().await? {
        info!(
            "{}-{:02} | orders {:>4} | customers {:>4} | revenue {:>11.2} | avg {:>8.2}",
            row.year,
            row.month,
            row.total_orders,
            row.unique_customers,
            row.total_revenue,
            row.avg_order_value
        );
    }

    if report.passed() {
        info!("All consistency checks passed.");
    } else {
        warn!(
            "{} consistency violation(s) found.",
            report.violations.len()
        );
    }
    Ok(())
}
