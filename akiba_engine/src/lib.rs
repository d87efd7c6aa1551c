//! Akiba Savings Engine
//!
//! The Akiba engine is the core of a custodial savings backend that keeps three independently-updatable sources of
//! truth consistent for a single logical balance per user: the local database, an on-chain savings ledger, and a
//! mobile-money payment provider that reports settlements through asynchronous callbacks.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You should never need to
//!    access the database directly; use the public APIs instead. The exception is the data types used in the
//!    database, which are defined in the `db_types` module and are public.
//! 2. The reconciliation API ([`mod@rec_api`]). [`rec_api::ReconciliationApi`] is the single authority that
//!    transitions money state: it consumes ledger events and payment callbacks, matches them to pending operations,
//!    applies balance and goal mutations atomically, invalidates cached read views, and publishes settlement events.
//!    [`rec_api::SavingsApi`] is the read/write surface consumed by the HTTP layer.
//! 3. The collaborator boundaries ([`mod@ledger`], [`mod@gateway`]): traits and wire types for the on-chain ledger
//!    client and the mobile-money gateway. Concrete implementations live with the server.
//!
//! The engine also provides a set of events that can be subscribed to. These events are emitted when a pending
//! operation reaches a terminal state. A simple actor framework is used so that you can hook into these events and
//! perform custom actions (the server wires them to the notification dispatcher).
pub mod cache;
pub mod db_types;
pub mod events;
pub mod gateway;
pub mod helpers;
pub mod ledger;
mod rec_api;
pub mod retry;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use rec_api::{
    objects::{GoalView, Pagination, TransactionList},
    errors::{ReconciliationError, SavingsApiError},
    reconciliation_api::{ReconciliationApi, SettlementOutcome},
    savings_api::{DepositRequest, PaymentMethod, SavingsApi, WithdrawalRequest},
};
