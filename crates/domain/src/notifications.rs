//! Notification payloads and best-effort delivery.
//!
//! Delivery happens after the unit of work commits. A failure is logged and
//! counted, then handed back as a warning string for the response.

use common::OrderId;
use notify::{NotificationDispatcher, PushMessage, StaffTopic};
use serde_json::{Value, json};
use store::MenuItem;
use tracing::warn;

pub const NO_DEVICE_TOKEN_WARNING: &str =
    "no device token registered for student; notification not sent";

pub fn new_order_payload(order_id: OrderId) -> Value {
    json!({ "order_id": order_id })
}

pub fn stock_alert_payload(item: &MenuItem) -> Value {
    json!({
        "menu_item_id": item.id,
        "name": item.name,
        "stock": item.stock,
    })
}

pub fn confirmation_payload(order_id: OrderId) -> Value {
    json!({ "order_id": order_id, "status": "CONFIRMED" })
}

/// Push sent to the owner when staff dispatch an order.
pub fn ready_for_collection(order_id: OrderId) -> PushMessage {
    PushMessage::new(
        "Order Ready for Collection",
        format!("Please confirm collection for your order #{order_id}"),
        json!({ "order_id": order_id.to_string() }),
    )
}

/// Broadcasts on a staff topic, returning a warning instead of an error.
pub(crate) async fn broadcast(
    notifier: &dyn NotificationDispatcher,
    topic: StaffTopic,
    payload: Value,
) -> Option<String> {
    match notifier.broadcast(topic, payload).await {
        Ok(()) => None,
        Err(e) => {
            metrics::counter!("notifications_failed_total", "channel" => topic.as_str())
                .increment(1);
            warn!(%topic, error = %e, "Staff broadcast failed");
            Some(format!("failed to notify staff: {e}"))
        }
    }
}

/// Pushes to a student's device, returning a warning when the push could
/// not be sent.
pub(crate) async fn push(
    notifier: &dyn NotificationDispatcher,
    device_token: Option<&str>,
    message: PushMessage,
) -> Option<String> {
    let Some(token) = device_token.filter(|t| !t.trim().is_empty()) else {
        return Some(NO_DEVICE_TOKEN_WARNING.to_string());
    };
    match notifier.push(token, message).await {
        Ok(()) => None,
        Err(e) => {
            metrics::counter!("notifications_failed_total", "channel" => "push").increment(1);
            warn!(error = %e, "Device push failed");
            Some(format!("failed to send notification: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::RecordingNotifier;

    #[tokio::test]
    async fn test_missing_token_warns_without_sending() {
        let notifier = RecordingNotifier::new();
        let warning = push(&notifier, None, ready_for_collection(OrderId::new())).await;
        assert_eq!(warning.as_deref(), Some(NO_DEVICE_TOKEN_WARNING));
        assert!(notifier.pushes().is_empty());
    }

    #[tokio::test]
    async fn test_failed_push_warns() {
        let notifier = RecordingNotifier::new();
        notifier.set_fail_on_push(true);
        let warning = push(&notifier, Some("tok"), ready_for_collection(OrderId::new()))
            .await
            .unwrap();
        assert!(warning.starts_with("failed to send notification: "));
    }

    #[test]
    fn test_push_body_names_order() {
        let order_id = OrderId::new();
        let message = ready_for_collection(order_id);
        assert_eq!(message.title, "Order Ready for Collection");
        assert_eq!(
            message.body,
            format!("Please confirm collection for your order #{order_id}")
        );
        assert_eq!(message.data["order_id"], order_id.to_string());
    }
}
