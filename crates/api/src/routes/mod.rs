//! HTTP route handlers and the state they share.

pub mod balances;
pub mod events;
pub mod health;
pub mod menu;
pub mod metrics;
pub mod orders;
pub mod payment;
pub mod rfid;
pub mod students;
pub mod transactions;

use std::str::FromStr;
use std::sync::Arc;

use domain::{OrderWorkflow, RfidRegistry};
use notify::BroadcastNotifier;
use store::CanteenStore;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CanteenStore> {
    pub workflow: OrderWorkflow<S>,
    pub rfid: Arc<RfidRegistry<S>>,
    pub notifier: BroadcastNotifier,
    pub store: S,
}

/// Parses a path or body identifier, reporting which field was malformed.
pub(crate) fn parse_id<T: FromStr>(raw: &str, field: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {field}: {e}")))
}
