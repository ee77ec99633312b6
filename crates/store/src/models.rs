//! Row models for the canteen tables.
//!
//! Cross-references are identifiers only; nothing here owns another row.

use chrono::{DateTime, Utc};
use common::{MenuItemId, Money, OrderId, OrderStatus, StudentId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A student identity row, provisioned by the credential service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub email: String,
    /// Push token of the student's registered device, if any.
    pub device_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Student {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: StudentId::new(),
            name: name.into(),
            email: email.into(),
            device_token: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_device_token(mut self, token: impl Into<String>) -> Self {
        self.device_token = Some(token.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub name: String,
    pub price: Money,
    /// Units available; never negative.
    pub stock: i32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl MenuItem {
    pub fn new(name: impl Into<String>, price: Money, stock: i32) -> Self {
        Self {
            id: MenuItemId::new(),
            name: name.into(),
            price,
            stock,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// One line of an order. The price is the menu price captured when the
/// order was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: Uuid,
    pub menu_item_id: MenuItemId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLineItem {
    pub fn new(menu_item_id: MenuItemId, quantity: u32, unit_price: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            menu_item_id,
            quantity,
            unit_price,
        }
    }

    /// Returns `unit_price * quantity`, or `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub student_id: StudentId,
    pub items: Vec<OrderLineItem>,
    /// Sum of the line totals, frozen at creation.
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub student_id: StudentId,
    pub amount: Money,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    pub fn new(student_id: StudentId, amount: Money) -> Self {
        Self {
            student_id,
            amount,
            updated_at: Utc::now(),
        }
    }
}

/// Immutable record of money moving for an order. Keyed by
/// `(student_id, order_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub student_id: StudentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfidMapping {
    pub tag_id: String,
    pub student_id: StudentId,
    pub created_at: DateTime<Utc>,
}

impl RfidMapping {
    pub fn new(tag_id: impl Into<String>, student_id: StudentId) -> Self {
        Self {
            tag_id: tag_id.into(),
            student_id,
            created_at: Utc::now(),
        }
    }
}
