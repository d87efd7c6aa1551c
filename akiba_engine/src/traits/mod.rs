//! The behaviour contracts that a storage backend must implement to drive the Akiba reconciliation engine.
//!
//! The traits are split by concern:
//! * [`ReconciliationDatabase`]: the write path. The reconciliation engine is the only caller; every method that
//!   mutates money state runs in a single atomic database transaction.
//! * [`ProjectionReads`]: the read path consumed by the savings API (balances, history, goals).
//! * [`UserManagement`]: user records and wallet-address binding.
mod data_objects;
mod projection_reads;
mod reconciliation_db;
mod user_management;

pub use data_objects::{GoalRef, Pagination, Settlement, SettleOutcome, SweepResult};
pub use projection_reads::ProjectionReads;
pub use reconciliation_db::{ReconciliationDatabase, StoreError};
pub use user_management::{UserManagement, UserStoreError};
