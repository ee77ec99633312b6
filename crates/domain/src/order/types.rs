//! Inputs and results of order workflow operations.

use common::MenuItemId;
use store::Order;

/// One requested line of a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub menu_item_id: MenuItemId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(menu_item_id: MenuItemId, quantity: u32) -> Self {
        Self {
            menu_item_id,
            quantity,
        }
    }
}

/// A committed order plus a warning if the follow-up notification failed.
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub order: Order,
    pub warning: Option<String>,
}

/// Result of dispatching an order to the counter.
///
/// `warning` is set when the owner could not be pushed, either because no
/// device is registered or because delivery failed.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub order: Order,
    pub warning: Option<String>,
}
