//! Domain error types.

use common::{MenuItemId, Money, OrderId, OrderStatus, StudentId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during domain operations.
///
/// Every validation error is raised before the unit of work mutates
/// anything, so a failed call leaves the store untouched.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A stock change would take a menu item below zero.
    #[error("Insufficient stock for {name}: requested {requested}, available {available}")]
    InsufficientStock {
        menu_item_id: MenuItemId,
        name: String,
        requested: i64,
        available: i32,
    },

    /// A debit exceeds the student's balance.
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Money, available: Money },

    /// The order's status does not allow the requested transition.
    #[error("Order {order_id} is {status}; cannot {action}")]
    InvalidState {
        order_id: OrderId,
        status: OrderStatus,
        action: &'static str,
    },

    /// The caller does not own the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A transaction for this student and order was already recorded.
    #[error("Transaction already recorded for student {student_id} and order {order_id}")]
    DuplicateTransaction {
        student_id: StudentId,
        order_id: OrderId,
    },

    /// The request is malformed.
    #[error("{0}")]
    BadInput(String),

    /// The datastore failed.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        DomainError::BadInput(message.into())
    }

    /// Returns the stable error code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::NotFound { .. } => "NOT_FOUND",
            DomainError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            DomainError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            DomainError::InvalidState { .. } => "INVALID_STATE",
            DomainError::Forbidden(_) => "FORBIDDEN",
            DomainError::DuplicateTransaction { .. } => "DUPLICATE_TRANSACTION",
            DomainError::BadInput(_) => "BAD_INPUT",
            DomainError::Store(_) => "INTERNAL",
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RowNotFound { table, key } => DomainError::NotFound { entity: table, id: key },
            other => DomainError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DomainError = StoreError::RowNotFound {
            table: "orders",
            key: "abc".to_string(),
        }
        .into();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.to_string(), "orders not found: abc");
    }

    #[test]
    fn test_other_store_errors_are_internal() {
        let err: DomainError = StoreError::ConstraintViolation("stock".to_string()).into();
        assert!(matches!(err, DomainError::Store(_)));
        assert_eq!(err.code(), "INTERNAL");
    }

    #[test]
    fn test_invalid_state_message() {
        let order_id = OrderId::new();
        let err = DomainError::InvalidState {
            order_id,
            status: OrderStatus::Completed,
            action: "dispatch",
        };
        assert_eq!(
            err.to_string(),
            format!("Order {order_id} is COMPLETED; cannot dispatch")
        );
    }
}
