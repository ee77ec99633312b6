//! Order placement, status transitions and payment settlement.

mod payment;
mod types;
mod workflow;

pub use payment::{CallbackOutcome, PaymentCallback, PaymentInitiation, PaymentStatus};
pub use types::{DispatchOutcome, OrderLine, OrderOutcome};
pub use workflow::OrderWorkflow;
