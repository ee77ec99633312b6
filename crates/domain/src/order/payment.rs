//! Out-of-band payment entry points.
//!
//! Orders placed through `create_order` settle themselves against the
//! prepaid balance and already carry a transaction. The callback is a
//! secondary settlement path, so a repeated or late SUCCESS for a settled
//! order hits the transaction key and changes nothing.

use std::str::FromStr;

use chrono::Utc;
use common::{Money, OrderId, OrderStatus, StudentId};
use notify::StaffTopic;
use store::{CanteenStore, Order, StoreTx};
use tracing::{info, warn};
use uuid::Uuid;

use super::workflow::{OrderWorkflow, lock_order, record_transition};
use crate::error::{DomainError, Result};
use crate::notifications;

pub const PAYMENT_INITIATED_MESSAGE: &str = "Payment initiated.";

/// Reference handed to the client when it starts a gateway payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInitiation {
    pub order_id: OrderId,
    pub transaction_reference: Uuid,
    pub message: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Success,
    Failure,
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(PaymentStatus::Success),
            "FAILURE" => Ok(PaymentStatus::Failure),
            _ => Err(DomainError::bad_input(format!("Invalid payment status: {s}"))),
        }
    }
}

/// Notification from the payment gateway.
#[derive(Debug, Clone)]
pub struct PaymentCallback {
    pub transaction_reference: Option<String>,
    pub order_id: OrderId,
    pub amount: Money,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// The order is now PAID and its transaction recorded.
    Settled {
        order: Order,
        warning: Option<String>,
    },
    /// The gateway reported a failure; nothing changed.
    Ignored,
}

impl<S: CanteenStore> OrderWorkflow<S> {
    /// Starts a gateway payment for the requester's own order.
    ///
    /// Only a reference is issued. The order is unchanged until the gateway
    /// calls back.
    #[tracing::instrument(skip(self))]
    pub async fn initiate_payment(
        &self,
        order_id: OrderId,
        requester: StudentId,
    ) -> Result<PaymentInitiation> {
        let order = self.get_order(order_id).await?;
        if order.student_id != requester {
            return Err(DomainError::Forbidden(format!(
                "order {order_id} belongs to another student"
            )));
        }

        let transaction_reference = Uuid::new_v4();
        info!(
            order_id = %order_id,
            amount = %order.total,
            %transaction_reference,
            "Payment initiated"
        );
        Ok(PaymentInitiation {
            order_id,
            transaction_reference,
            message: PAYMENT_INITIATED_MESSAGE,
        })
    }

    /// Applies a gateway callback.
    ///
    /// On success the status change and the transaction append commit
    /// together; a duplicate transaction rolls both back.
    #[tracing::instrument(skip(self), fields(order_id = %callback.order_id))]
    pub async fn handle_payment_callback(
        &self,
        callback: PaymentCallback,
    ) -> Result<CallbackOutcome> {
        let label = match callback.status {
            PaymentStatus::Success => "success",
            PaymentStatus::Failure => "failure",
        };
        metrics::counter!("payment_callbacks_total", "status" => label).increment(1);

        if callback.status == PaymentStatus::Failure {
            warn!(
                transaction_reference = ?callback.transaction_reference,
                "Payment failed; order left unchanged"
            );
            return Ok(CallbackOutcome::Ignored);
        }
        if !callback.amount.is_positive() {
            return Err(DomainError::bad_input("payment amount must be positive"));
        }

        let mut tx = self.store.begin().await?;
        let mut order = lock_order(&mut tx, callback.order_id).await?;
        order.status = OrderStatus::Paid;
        order.updated_at = Utc::now();
        tx.update_order_status(order.id, order.status, order.updated_at)
            .await?;
        self.transactions
            .append_in(&mut tx, order.student_id, order.id, callback.amount)
            .await?;
        tx.commit().await?;

        record_transition(OrderStatus::Paid);
        info!(amount = %callback.amount, "Payment settled");

        let warning = notifications::broadcast(
            self.notifier.as_ref(),
            StaffTopic::NewOrders,
            notifications::new_order_payload(order.id),
        )
        .await;

        Ok(CallbackOutcome::Settled { order, warning })
    }
}
