//! Order status state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Paid ──► AwaitingConfirmation ──► Completed
/// ```
///
/// `Pending` only exists while an order is being built inside the creation
/// unit of work; a persisted order is at least `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,

    /// Funds debited; waiting for staff to hand the order out.
    Paid,

    /// Staff dispatched the order; waiting for the student to confirm collection.
    AwaitingConfirmation,

    /// Student confirmed collection (terminal state).
    Completed,
}

impl OrderStatus {
    /// Returns true if staff may dispatch an order in this status.
    pub fn can_dispatch(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }

    /// Returns true if the owner may confirm collection in this status.
    pub fn can_confirm_collection(&self) -> bool {
        matches!(self, OrderStatus::AwaitingConfirmation)
    }

    /// Returns true if the order still needs to be handed out at the counter.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::AwaitingConfirmation
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed)
    }

    /// Statuses an RFID counter lookup considers.
    pub fn active() -> [OrderStatus; 2] {
        [OrderStatus::Paid, OrderStatus::AwaitingConfirmation]
    }

    /// Returns the status name as stored and sent over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::AwaitingConfirmation => "AWAITING_CONFIRMATION",
            OrderStatus::Completed => "COMPLETED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a status string does not name a known status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid status value: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = ParseStatusError;

    /// Parses a status name case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAID" => Ok(OrderStatus::Paid),
            "AWAITING_CONFIRMATION" => Ok(OrderStatus::AwaitingConfirmation),
            "COMPLETED" => Ok(OrderStatus::Completed),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}
