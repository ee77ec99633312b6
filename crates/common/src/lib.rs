//! Shared types for the canteen ordering backend.

pub mod ids;
pub mod money;
pub mod status;

pub use ids::{MenuItemId, OrderId, StudentId};
pub use money::Money;
pub use status::{OrderStatus, ParseStatusError};
