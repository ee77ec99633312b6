//! Domain layer for the canteen ordering backend.
//!
//! This crate provides:
//! - `OrderWorkflow`, which places orders and drives their status
//! - `StockManager`, `BalanceLedger` and `TransactionRecorder`
//! - `RfidRegistry` and the one-time code store gating tag registration
//! - Notification payloads sent to staff and students

pub mod error;
pub mod ledger;
pub mod notifications;
pub mod order;
pub mod otp;
pub mod rfid;
pub mod stock;
pub mod transactions;

pub use error::{DomainError, Result};
pub use ledger::BalanceLedger;
pub use order::{
    CallbackOutcome, DispatchOutcome, OrderLine, OrderOutcome, OrderWorkflow, PaymentCallback,
    PaymentInitiation, PaymentStatus,
};
pub use otp::{LogOtpSender, OtpSender, OtpStore};
pub use rfid::{RfidLookup, RfidRegistry};
pub use stock::{DEFAULT_LOW_STOCK_THRESHOLD, StockManager};
pub use transactions::TransactionRecorder;
