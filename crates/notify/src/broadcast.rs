//! In-process notifier built on tokio broadcast channels.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::dispatcher::{NotificationDispatcher, PushMessage, StaffTopic};
use crate::error::{NotifyError, Result};

const DEFAULT_CAPACITY: usize = 256;

/// A payload published on a staff topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaffEvent {
    pub topic: StaffTopic,
    pub payload: Value,
}

/// A push addressed to one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevicePush {
    pub device_token: String,
    pub message: PushMessage,
}

/// Fans staff topics out to every live subscriber and hands device pushes
/// to whichever gateway subscribed to them.
///
/// Slow subscribers lag and lose the oldest messages instead of blocking
/// publishers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    topics: HashMap<StaffTopic, broadcast::Sender<StaffEvent>>,
    pushes: broadcast::Sender<DevicePush>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a notifier whose channels buffer `capacity` messages per
    /// subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let topics = StaffTopic::ALL
            .into_iter()
            .map(|topic| (topic, broadcast::channel(capacity).0))
            .collect();
        let (pushes, _) = broadcast::channel(capacity);
        Self { topics, pushes }
    }

    /// Subscribes to one staff topic.
    pub fn subscribe(&self, topic: StaffTopic) -> broadcast::Receiver<StaffEvent> {
        self.sender(topic).subscribe()
    }

    /// Subscribes to outgoing device pushes. A push gateway holds this
    /// receiver and forwards each message to the device.
    pub fn subscribe_pushes(&self) -> broadcast::Receiver<DevicePush> {
        self.pushes.subscribe()
    }

    fn sender(&self, topic: StaffTopic) -> &broadcast::Sender<StaffEvent> {
        // Every topic gets a channel in with_capacity.
        &self.topics[&topic]
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationDispatcher for BroadcastNotifier {
    async fn broadcast(&self, topic: StaffTopic, payload: Value) -> Result<()> {
        let event = StaffEvent { topic, payload };
        match self.sender(topic).send(event) {
            Ok(receivers) => debug!(%topic, receivers, "Broadcast staff event"),
            Err(_) => debug!(%topic, "Broadcast staff event with no subscribers"),
        }
        Ok(())
    }

    async fn push(&self, device_token: &str, message: PushMessage) -> Result<()> {
        if device_token.trim().is_empty() {
            return Err(NotifyError::EmptyDeviceToken);
        }

        let push = DevicePush {
            device_token: device_token.to_string(),
            message,
        };
        self.pushes
            .send(push)
            .map_err(|_| NotifyError::NoPushGateway)?;
        debug!("Queued device push");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscriber_receives_topic_events() {
        let notifier = BroadcastNotifier::new();
        let mut orders = notifier.subscribe(StaffTopic::NewOrders);
        let mut alerts = notifier.subscribe(StaffTopic::StockAlerts);

        notifier
            .broadcast(StaffTopic::NewOrders, json!({"order_id": "abc"}))
            .await
            .unwrap();

        let event = orders.recv().await.unwrap();
        assert_eq!(event.topic, StaffTopic::NewOrders);
        assert_eq!(event.payload["order_id"], "abc");
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::new();
        let result = notifier
            .broadcast(StaffTopic::StockAlerts, json!({"stock": 1}))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_push_without_gateway_fails() {
        let notifier = BroadcastNotifier::new();
        let message = PushMessage::new("t", "b", json!({}));
        let err = notifier.push("device-1", message).await.unwrap_err();
        assert!(matches!(err, NotifyError::NoPushGateway));
    }

    #[tokio::test]
    async fn test_push_reaches_gateway() {
        let notifier = BroadcastNotifier::new();
        let mut gateway = notifier.subscribe_pushes();
        let message = PushMessage::new("Ready", "Come get it", json!({"order_id": "1"}));

        notifier.push("device-1", message.clone()).await.unwrap();

        let push = gateway.recv().await.unwrap();
        assert_eq!(push.device_token, "device-1");
        assert_eq!(push.message, message);
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let notifier = BroadcastNotifier::new();
        let _gateway = notifier.subscribe_pushes();
        let err = notifier
            .push("  ", PushMessage::new("t", "b", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::EmptyDeviceToken));
    }
}
