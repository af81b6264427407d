//! Materialization engine - persisted snapshots of the weekly category and monthly
//! rollups.
//!
//! `SQLite` has no materialized views, so each rollup is a plain table whose rows are
//! tagged with a `snapshot_version`. The matching `rollup_state` row names the version
//! readers see. A refresh writes a complete new version next to the old one and then
//! flips `active_version` in a single short transaction, which is the only state
//! change a reader can observe.
//!
//! Two refresh modes exist:
//!
//! - **Concurrent** refresh runs alongside readers. It needs the rollup's unique index
//!   and the `refresh_in_progress` flag; if either precondition fails it returns
//!   [`Error::RefreshConflict`].
//! - **Blocking** refresh takes the engine's reader gate exclusively and replaces every
//!   row inside one transaction.
//!
//! [`MaterializationEngine::refresh`] tries the concurrent path first and falls back to
//! the blocking path once.

use crate::{
    config::database::create_table_if_missing,
    core::{
        rollup::{self, MonthlyRow, WeeklyCategoryRow},
        snapshot::{FactSnapshot, RollupRows},
    },
    entities::{
        MonthlyRollup, MonthlyRollupColumn, RollupState, RollupStateColumn, WeeklyCategoryRollup,
        WeeklyCategoryRollupColumn, monthly_rollup, rollup_state, weekly_category_rollup,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDateTime, Utc};
use sea_orm::sea_query::{Expr, Index, IndexCreateStatement, Table};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, QueryOrder, Set, Statement, TransactionTrait, prelude::*,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Rows per `INSERT` statement, well under `SQLite`'s bound-parameter limit.
const INSERT_BATCH: usize = 500;

/// The rollups that are persisted rather than computed on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MaterializedRollup {
    /// One row per (ISO week, category)
    WeeklyCategory,
    /// One row per calendar month
    Monthly,
}

impl MaterializedRollup {
    /// Every materialized rollup, in build order.
    pub const ALL: [Self; 2] = [Self::WeeklyCategory, Self::Monthly];

    /// Name of the rollup and of its table.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::WeeklyCategory => "weekly_category_rollup",
            Self::Monthly => "monthly_rollup",
        }
    }

    /// Name of the unique index over the snapshot version and grouping key.
    #[must_use]
    pub const fn index_name(self) -> &'static str {
        match self {
            Self::WeeklyCategory => "idx_weekly_category_rollup_key",
            Self::Monthly => "idx_monthly_rollup_key",
        }
    }

    fn unique_index(self) -> IndexCreateStatement {
        let mut index = Index::create();
        index.if_not_exists().unique().name(self.index_name());
        match self {
            Self::WeeklyCategory => index
                .table(WeeklyCategoryRollup)
                .col(WeeklyCategoryRollupColumn::SnapshotVersion)
                .col(WeeklyCategoryRollupColumn::WeekStart)
                .col(WeeklyCategoryRollupColumn::Category),
            Self::Monthly => index
                .table(MonthlyRollup)
                .col(MonthlyRollupColumn::SnapshotVersion)
                .col(MonthlyRollupColumn::MonthStart),
        };
        index
    }
}

impl fmt::Display for MaterializedRollup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a refresh was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshMode {
    /// Readers kept seeing the old snapshot until the swap
    Concurrent,
    /// Readers were excluded while rows were replaced
    Blocking,
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concurrent => f.write_str("concurrent"),
            Self::Blocking => f.write_str("blocking"),
        }
    }
}

/// Result of a successful build or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    /// Which rollup was refreshed
    pub rollup: MaterializedRollup,
    /// How it was refreshed
    pub mode: RefreshMode,
    /// Snapshot version now active
    pub version: i64,
    /// Rows in the new snapshot
    pub rows: usize,
}

/// Current state of one materialized rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedStatus {
    /// The rollup described
    pub rollup: MaterializedRollup,
    /// Whether its table exists
    pub table_exists: bool,
    /// Whether its unique index exists
    pub index_exists: bool,
    /// Version readers see, 0 before the first build
    pub active_version: i64,
    /// Rows in the active snapshot
    pub row_count: i64,
    /// When the active snapshot was swapped in
    pub refreshed_at: Option<NaiveDateTime>,
}

/// Overview of every derived result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedMetadata {
    /// Rollups computed on every read
    pub on_demand: Vec<&'static str>,
    /// Persisted rollups and their snapshot state
    pub materialized: Vec<MaterializedStatus>,
}

/// Freshly computed rows for one materialized rollup.
enum ComputedRows {
    Weekly(RollupRows<WeeklyCategoryRow>),
    Monthly(RollupRows<MonthlyRow>),
}

impl ComputedRows {
    fn compute(rollup: MaterializedRollup, facts: &FactSnapshot) -> Self {
        match rollup {
            MaterializedRollup::WeeklyCategory => {
                Self::Weekly(rollup::weekly_category_rollup(facts))
            }
            MaterializedRollup::Monthly => Self::Monthly(rollup::monthly_rollup(facts)),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Weekly(rows) => rows.len(),
            Self::Monthly(rows) => rows.len(),
        }
    }

    /// Writes every row under `version`.
    async fn insert<C>(&self, db: &C, version: i64) -> Result<()>
    where
        C: ConnectionTrait,
    {
        match self {
            Self::Weekly(rows) => {
                let models: Vec<weekly_category_rollup::ActiveModel> = rows
                    .iter()
                    .map(|r| weekly_category_rollup::ActiveModel {
                        snapshot_version: Set(version),
                        week_start: Set(r.week_start),
                        category: Set(r.category.clone()),
                        orders_in_category: Set(r.orders_in_category),
                        unique_customers_in_category: Set(r.unique_customers_in_category),
                        revenue_in_category: Set(r.revenue_in_category),
                        items_sold_in_category: Set(r.items_sold_in_category),
                        avg_order_value_in_category: Set(r.avg_order_value_in_category),
                        unique_products_in_category: Set(r.unique_products_in_category),
                        ..Default::default()
                    })
                    .collect();
                for batch in models.chunks(INSERT_BATCH) {
                    WeeklyCategoryRollup::insert_many(batch.to_vec())
                        .exec(db)
                        .await?;
                }
            }
            Self::Monthly(rows) => {
                let models: Vec<monthly_rollup::ActiveModel> = rows
                    .iter()
                    .map(|r| monthly_rollup::ActiveModel {
                        snapshot_version: Set(version),
                        month_start: Set(r.month_start),
                        year: Set(r.year),
                        month: Set(r.month),
                        total_orders: Set(r.total_orders),
                        unique_customers: Set(r.unique_customers),
                        total_revenue: Set(r.total_revenue),
                        total_items_sold: Set(r.total_items_sold),
                        avg_order_value: Set(r.avg_order_value),
                        ..Default::default()
                    })
                    .collect();
                for batch in models.chunks(INSERT_BATCH) {
                    MonthlyRollup::insert_many(batch.to_vec()).exec(db).await?;
                }
            }
        }
        Ok(())
    }
}

/// Which snapshot versions a delete targets.
#[derive(Debug, Clone, Copy)]
enum Versions {
    All,
    Exactly(i64),
    OlderThan(i64),
}

async fn delete_rows<C>(db: &C, rollup: MaterializedRollup, versions: Versions) -> Result<u64>
where
    C: ConnectionTrait,
{
    let result = match rollup {
        MaterializedRollup::WeeklyCategory => {
            let col = WeeklyCategoryRollupColumn::SnapshotVersion;
            let query = WeeklyCategoryRollup::delete_many();
            match versions {
                Versions::All => query,
                Versions::Exactly(v) => query.filter(col.eq(v)),
                Versions::OlderThan(v) => query.filter(col.lt(v)),
            }
            .exec(db)
            .await?
        }
        MaterializedRollup::Monthly => {
            let col = MonthlyRollupColumn::SnapshotVersion;
            let query = MonthlyRollup::delete_many();
            match versions {
                Versions::All => query,
                Versions::Exactly(v) => query.filter(col.eq(v)),
                Versions::OlderThan(v) => query.filter(col.lt(v)),
            }
            .exec(db)
            .await?
        }
    };
    Ok(result.rows_affected)
}

async fn find_state<C>(db: &C, rollup: MaterializedRollup) -> Result<Option<rollup_state::Model>>
where
    C: ConnectionTrait,
{
    RollupState::find()
        .filter(RollupStateColumn::RollupName.eq(rollup.name()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Returns the state row for `rollup`, inserting a fresh one if needed.
async fn register<C>(db: &C, rollup: MaterializedRollup) -> Result<rollup_state::Model>
where
    C: ConnectionTrait,
{
    if let Some(state) = find_state(db, rollup).await? {
        return Ok(state);
    }
    let state = rollup_state::ActiveModel {
        rollup_name: Set(rollup.name().to_string()),
        active_version: Set(0),
        next_version: Set(1),
        refresh_in_progress: Set(false),
        row_count: Set(0),
        refreshed_at: Set(None),
        ..Default::default()
    };
    debug!("Registering materialized rollup {}", rollup);
    state.insert(db).await.map_err(Into::into)
}

async fn sqlite_object_exists<C>(db: &C, kind: &str, name: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let stmt = Statement::from_sql_and_values(
        db.get_database_backend(),
        "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = ? AND name = ?",
        [kind.into(), name.into()],
    );
    let found = match db.query_one(stmt).await? {
        Some(row) => row.try_get::<i64>("", "n")? > 0,
        None => false,
    };
    Ok(found)
}

fn conflict(rollup: MaterializedRollup, reason: &str) -> Error {
    Error::RefreshConflict {
        rollup: rollup.name().to_string(),
        reason: reason.to_string(),
    }
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Builds, refreshes and serves the materialized rollups.
///
/// Cloning is cheap and clones share the same reader gate, so a blocking refresh on
/// one clone excludes readers on every other.
#[derive(Debug, Clone)]
pub struct MaterializationEngine {
    db: DatabaseConnection,
    gate: Arc<RwLock<()>>,
}

impl MaterializationEngine {
    /// Creates an engine over `db`.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            gate: Arc::new(RwLock::new(())),
        }
    }

    /// The connection this engine writes through.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn create_table(&self, rollup: MaterializedRollup) -> Result<()> {
        match rollup {
            MaterializedRollup::WeeklyCategory => {
                create_table_if_missing(&self.db, WeeklyCategoryRollup).await
            }
            MaterializedRollup::Monthly => create_table_if_missing(&self.db, MonthlyRollup).await,
        }
    }

    /// Whether the rollup's table exists.
    pub async fn table_exists(&self, rollup: MaterializedRollup) -> Result<bool> {
        sqlite_object_exists(&self.db, "table", rollup.name()).await
    }

    /// Whether the rollup's unique index exists.
    pub async fn index_exists(&self, rollup: MaterializedRollup) -> Result<bool> {
        sqlite_object_exists(&self.db, "index", rollup.index_name()).await
    }

    /// Creates the unique index over the snapshot version and grouping key.
    ///
    /// Idempotent. The rollup must have been built first.
    pub async fn ensure_indexes(&self, rollup: MaterializedRollup) -> Result<()> {
        let builder = self.db.get_database_backend();
        self.db.execute(builder.build(&rollup.unique_index())).await?;
        debug!("Ensured index {} on {}", rollup.index_name(), rollup);
        Ok(())
    }

    /// Computes the rollup in full and replaces the persisted snapshot atomically.
    ///
    /// Creates the table on first use. A failed attempt is retried once; either way the
    /// previous snapshot stays intact until a replacement commits.
    pub async fn build(&self, rollup: MaterializedRollup) -> Result<RefreshOutcome> {
        let _exclusive = self.gate.write().await;
        let outcome = match self.replace_snapshot(rollup).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Build of {} failed, retrying once: {}", rollup, e);
                self.replace_snapshot(rollup).await?
            }
        };
        info!(
            "Built {} at version {} ({} rows)",
            rollup, outcome.version, outcome.rows
        );
        Ok(outcome)
    }

    /// Refreshes the rollup, preferring the concurrent path.
    ///
    /// Any failure of the concurrent path is logged and followed by exactly one blocking
    /// refresh, whose failure is returned.
    pub async fn refresh(&self, rollup: MaterializedRollup) -> Result<RefreshOutcome> {
        match self.refresh_concurrently(rollup).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(
                    "Concurrent refresh of {} failed ({}), falling back to blocking refresh",
                    rollup, e
                );
                self.refresh_blocking(rollup).await
            }
        }
    }

    /// Refreshes the rollup while readers keep seeing the previous snapshot.
    ///
    /// Returns [`Error::RefreshConflict`] when the unique index is missing, another
    /// refresh holds the rollup, or a newer snapshot was swapped in meanwhile. An
    /// abandoned attempt releases the rollup and removes the rows it wrote.
    pub async fn refresh_concurrently(&self, rollup: MaterializedRollup) -> Result<RefreshOutcome> {
        let _shared = self.gate.read().await;

        if !self.index_exists(rollup).await? {
            return Err(conflict(rollup, "unique index is missing"));
        }
        register(&self.db, rollup).await?;

        let claimed = RollupState::update_many()
            .col_expr(RollupStateColumn::RefreshInProgress, Expr::value(true))
            .filter(RollupStateColumn::RollupName.eq(rollup.name()))
            .filter(RollupStateColumn::RefreshInProgress.eq(false))
            .exec(&self.db)
            .await?;
        if claimed.rows_affected == 0 {
            return Err(conflict(rollup, "another refresh is in progress"));
        }

        let version = match self.allocate_version(rollup).await {
            Ok(version) => version,
            Err(e) => {
                self.release(rollup).await;
                return Err(e);
            }
        };

        match self.publish(rollup, version).await {
            Ok(rows) => {
                if let Err(e) = delete_rows(&self.db, rollup, Versions::OlderThan(version)).await {
                    warn!("Could not prune old snapshots of {}: {}", rollup, e);
                }
                info!(
                    "Concurrently refreshed {} to version {} ({} rows)",
                    rollup, version, rows
                );
                Ok(RefreshOutcome {
                    rollup,
                    mode: RefreshMode::Concurrent,
                    version,
                    rows,
                })
            }
            Err(e) => {
                self.release(rollup).await;
                let abandoned = Versions::Exactly(version);
                if let Err(cleanup) = delete_rows(&self.db, rollup, abandoned).await {
                    warn!(
                        "Could not remove abandoned version {} of {}: {}",
                        version, rollup, cleanup
                    );
                }
                Err(e)
            }
        }
    }

    /// Replaces the rollup's rows while excluding readers.
    ///
    /// Also recreates the unique index if it is missing, so the next refresh can run
    /// concurrently again.
    pub async fn refresh_blocking(&self, rollup: MaterializedRollup) -> Result<RefreshOutcome> {
        let _exclusive = self.gate.write().await;
        let outcome = self.replace_snapshot(rollup).await?;
        self.ensure_indexes(rollup).await?;
        info!(
            "Blocking refresh of {} produced version {} ({} rows)",
            rollup, outcome.version, outcome.rows
        );
        Ok(outcome)
    }

    /// Hands out the next snapshot version.
    async fn allocate_version(&self, rollup: MaterializedRollup) -> Result<i64> {
        let txn = self.db.begin().await?;
        let state = register(&txn, rollup).await?;
        let version = state.next_version;
        let mut active: rollup_state::ActiveModel = state.into();
        active.next_version = Set(version + 1);
        active.update(&txn).await?;
        txn.commit().await?;
        Ok(version)
    }

    /// Computes and writes the rows of `version`, then makes it the active snapshot.
    async fn publish(&self, rollup: MaterializedRollup, version: i64) -> Result<usize> {
        let facts = FactSnapshot::load(&self.db).await?;
        let rows = ComputedRows::compute(rollup, &facts);
        rows.insert(&self.db, version).await?;
        self.swap(rollup, version, rows.len()).await?;
        Ok(rows.len())
    }

    /// Makes the already written `version` the active snapshot and clears the refresh
    /// flag. Refused if the active snapshot is already at or past `version`.
    async fn swap(&self, rollup: MaterializedRollup, version: i64, rows: usize) -> Result<()> {
        let txn = self.db.begin().await?;
        let swapped = RollupState::update_many()
            .col_expr(RollupStateColumn::ActiveVersion, Expr::value(version))
            .col_expr(RollupStateColumn::RefreshInProgress, Expr::value(false))
            .col_expr(RollupStateColumn::RowCount, Expr::value(count(rows)))
            .col_expr(
                RollupStateColumn::RefreshedAt,
                Expr::value(Some(Utc::now().naive_utc())),
            )
            .filter(RollupStateColumn::RollupName.eq(rollup.name()))
            .filter(RollupStateColumn::ActiveVersion.lt(version))
            .exec(&txn)
            .await?;
        if swapped.rows_affected == 0 {
            txn.rollback().await?;
            return Err(conflict(rollup, "a newer snapshot is already active"));
        }
        txn.commit().await?;
        debug!("Swapped {} to version {}", rollup, version);
        Ok(())
    }

    /// Clears the refresh flag after an abandoned concurrent refresh.
    async fn release(&self, rollup: MaterializedRollup) {
        let released = RollupState::update_many()
            .col_expr(RollupStateColumn::RefreshInProgress, Expr::value(false))
            .filter(RollupStateColumn::RollupName.eq(rollup.name()))
            .exec(&self.db)
            .await;
        if let Err(e) = released {
            warn!("Could not release refresh flag of {}: {}", rollup, e);
        }
    }

    /// Replaces every row of the rollup in one transaction. Callers hold the gate
    /// exclusively.
    async fn replace_snapshot(&self, rollup: MaterializedRollup) -> Result<RefreshOutcome> {
        self.create_table(rollup).await?;
        let facts = FactSnapshot::load(&self.db).await?;
        let rows = ComputedRows::compute(rollup, &facts);

        let txn = self.db.begin().await?;
        let state = register(&txn, rollup).await?;
        let version = state.next_version.max(state.active_version + 1);

        delete_rows(&txn, rollup, Versions::All).await?;
        rows.insert(&txn, version).await?;

        let mut active: rollup_state::ActiveModel = state.into();
        active.active_version = Set(version);
        active.next_version = Set(version + 1);
        active.refresh_in_progress = Set(false);
        active.row_count = Set(count(rows.len()));
        active.refreshed_at = Set(Some(Utc::now().naive_utc()));
        active.update(&txn).await?;
        txn.commit().await?;

        Ok(RefreshOutcome {
            rollup,
            mode: RefreshMode::Blocking,
            version,
            rows: rows.len(),
        })
    }

    /// Active snapshot version of the rollup, 0 if it was never built.
    async fn active_version<C>(db: &C, rollup: MaterializedRollup) -> Result<i64>
    where
        C: ConnectionTrait,
    {
        Ok(find_state(db, rollup)
            .await?
            .map_or(0, |state| state.active_version))
    }

    /// Rows of the active weekly category snapshot in canonical order.
    ///
    /// Empty if the rollup was never built.
    pub async fn weekly_category_rows(&self) -> Result<RollupRows<WeeklyCategoryRow>> {
        let _shared = self.gate.read().await;
        let txn = self.db.begin().await?;
        let version = Self::active_version(&txn, MaterializedRollup::WeeklyCategory).await?;
        if version == 0 {
            txn.commit().await?;
            return Ok(Vec::new().into());
        }

        let models = WeeklyCategoryRollup::find()
            .filter(WeeklyCategoryRollupColumn::SnapshotVersion.eq(version))
            .order_by_desc(WeeklyCategoryRollupColumn::WeekStart)
            .all(&txn)
            .await?;
        txn.commit().await?;

        let mut rows: Vec<WeeklyCategoryRow> = models
            .into_iter()
            .map(|m| WeeklyCategoryRow {
                week_start: m.week_start,
                category: m.category,
                orders_in_category: m.orders_in_category,
                unique_customers_in_category: m.unique_customers_in_category,
                revenue_in_category: m.revenue_in_category,
                items_sold_in_category: m.items_sold_in_category,
                avg_order_value_in_category: m.avg_order_value_in_category,
                unique_products_in_category: m.unique_products_in_category,
            })
            .collect();
        rollup::sort_weekly(&mut rows);
        Ok(rows.into())
    }

    /// Rows of the active monthly snapshot, newest month first.
    ///
    /// Empty if the rollup was never built.
    pub async fn monthly_rows(&self) -> Result<RollupRows<MonthlyRow>> {
        let _shared = self.gate.read().await;
        let txn = self.db.begin().await?;
        let version = Self::active_version(&txn, MaterializedRollup::Monthly).await?;
        if version == 0 {
            txn.commit().await?;
            return Ok(Vec::new().into());
        }

        let models = MonthlyRollup::find()
            .filter(MonthlyRollupColumn::SnapshotVersion.eq(version))
            .order_by_desc(MonthlyRollupColumn::MonthStart)
            .all(&txn)
            .await?;
        txn.commit().await?;

        Ok(models
            .into_iter()
            .map(|m| MonthlyRow {
                month_start: m.month_start,
                year: m.year,
                month: m.month,
                total_orders: m.total_orders,
                unique_customers: m.unique_customers,
                total_revenue: m.total_revenue,
                total_items_sold: m.total_items_sold,
                avg_order_value: m.avg_order_value,
            })
            .collect::<Vec<_>>()
            .into())
    }

    /// Builds every materialized rollup and then creates its unique index.
    pub async fn build_all(&self) -> Result<Vec<RefreshOutcome>> {
        let mut outcomes = Vec::with_capacity(MaterializedRollup::ALL.len());
        for rollup in MaterializedRollup::ALL {
            outcomes.push(self.build(rollup).await?);
            self.ensure_indexes(rollup).await?;
        }
        Ok(outcomes)
    }

    /// Refreshes every materialized rollup.
    pub async fn refresh_all(&self) -> Result<Vec<RefreshOutcome>> {
        let mut outcomes = Vec::with_capacity(MaterializedRollup::ALL.len());
        for rollup in MaterializedRollup::ALL {
            outcomes.push(self.refresh(rollup).await?);
        }
        Ok(outcomes)
    }

    /// Drops every materialized rollup table and forgets its state. Idempotent.
    pub async fn drop_all(&self) -> Result<()> {
        let _exclusive = self.gate.write().await;
        let builder = self.db.get_database_backend();
        for rollup in MaterializedRollup::ALL {
            let drop = match rollup {
                MaterializedRollup::WeeklyCategory => Table::drop()
                    .table(WeeklyCategoryRollup)
                    .if_exists()
                    .to_owned(),
                MaterializedRollup::Monthly => {
                    Table::drop().table(MonthlyRollup).if_exists().to_owned()
                }
            };
            self.db.execute(builder.build(&drop)).await?;
            RollupState::delete_many()
                .filter(RollupStateColumn::RollupName.eq(rollup.name()))
                .exec(&self.db)
                .await?;
            info!("Dropped materialized rollup {}", rollup);
        }
        Ok(())
    }

    /// Lists the on-demand rollups and reports the state of each materialized one.
    pub async fn metadata(&self) -> Result<DerivedMetadata> {
        let mut materialized = Vec::with_capacity(MaterializedRollup::ALL.len());
        for rollup in MaterializedRollup::ALL {
            let state = find_state(&self.db, rollup).await?;
            materialized.push(MaterializedStatus {
                rollup,
                table_exists: self.table_exists(rollup).await?,
                index_exists: self.index_exists(rollup).await?,
                active_version: state.as_ref().map_or(0, |s| s.active_version),
                row_count: state.as_ref().map_or(0, |s| s.row_count),
                refreshed_at: state.and_then(|s| s.refreshed_at),
            });
        }
        Ok(DerivedMetadata {
            on_demand: rollup::ON_DEMAND_ROLLUPS.to_vec(),
            materialized,
        })
    }
}
