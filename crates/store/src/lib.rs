//! Transactional datastore for the canteen ordering backend.
//!
//! Every mutation that must be atomic runs inside a [`StoreTx`] obtained from
//! [`CanteenStore::begin`]. Rows read through the `lock_*` methods stay locked
//! until the unit of work commits or is dropped.

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use models::{Balance, MenuItem, Order, OrderLineItem, RfidMapping, Student, TransactionRecord};
pub use postgres::PostgresStore;
pub use query::OrderQuery;
pub use store::{CanteenStore, StoreTx};
