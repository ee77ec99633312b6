//! Notification port trait and message types.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Publish/subscribe topics staff dashboards listen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StaffTopic {
    /// A paid order is ready to prepare.
    NewOrders,
    /// A menu item's stock dropped below the alert threshold.
    StockAlerts,
    /// A student confirmed collection of an order.
    OrderConfirmations,
}

impl StaffTopic {
    pub const ALL: [StaffTopic; 3] = [
        StaffTopic::NewOrders,
        StaffTopic::StockAlerts,
        StaffTopic::OrderConfirmations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StaffTopic::NewOrders => "new-orders",
            StaffTopic::StockAlerts => "stock-alerts",
            StaffTopic::OrderConfirmations => "order-confirmations",
        }
    }
}

impl fmt::Display for StaffTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StaffTopic {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        StaffTopic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| format!("Unknown topic: {s}"))
    }
}

/// A point-to-point push to a student's device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    /// Key/value payload the device app reads.
    pub data: Value,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>, data: Value) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data,
        }
    }
}

/// Delivers staff broadcasts and student device pushes.
///
/// Implementations must not block on slow consumers. A broadcast with no
/// subscribers is not an error.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Publishes a JSON payload on a staff topic.
    async fn broadcast(&self, topic: StaffTopic, payload: Value) -> Result<()>;

    /// Sends a push message to a single device token.
    async fn push(&self, device_token: &str, message: PushMessage) -> Result<()>;
}
