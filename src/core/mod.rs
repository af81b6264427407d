/// Customer writes and lookups
pub mod customer;
/// Materialized rollup persistence and refresh
pub mod materialize;
/// Rounding and guarded averages
pub mod money;
/// Orders and the items they own
pub mod order;
/// Product catalog
pub mod product;
/// Rollup definitions over a fact snapshot
pub mod rollup;
/// Synthetic workload generation
pub mod seed;
/// Consistent reads of the fact store
pub mod snapshot;
/// Cross-checks between facts and rollups
pub mod verify;
