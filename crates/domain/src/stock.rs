//! Menu item stock levels.

use std::sync::Arc;

use common::MenuItemId;
use notify::{NotificationDispatcher, StaffTopic};
use store::{CanteenStore, MenuItem, StoreTx};
use tracing::info;

use crate::error::{DomainError, Result};
use crate::notifications;

/// Stock below this many units triggers a staff alert.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

/// Owns per-item available quantity.
///
/// Stock never goes negative: a delta that would take it below zero fails
/// with [`DomainError::InsufficientStock`] and changes nothing.
pub struct StockManager<S: CanteenStore> {
    store: S,
    notifier: Arc<dyn NotificationDispatcher>,
    low_stock_threshold: i32,
}

impl<S: CanteenStore> StockManager<S> {
    pub fn new(store: S, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            store,
            notifier,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
        }
    }

    pub fn with_low_stock_threshold(mut self, threshold: i32) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    pub fn is_low(&self, item: &MenuItem) -> bool {
        item.stock < self.low_stock_threshold
    }

    /// Applies a signed delta in its own unit of work and alerts staff when
    /// the new level is low.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(&self, id: MenuItemId, delta: i32) -> Result<MenuItem> {
        let mut tx = self.store.begin().await?;
        let item = self.adjust_in(&mut tx, id, delta).await?;
        tx.commit().await?;

        info!(menu_item_id = %id, stock = item.stock, "Stock adjusted");
        self.alert_if_low(&item).await;
        Ok(item)
    }

    /// Applies a signed delta inside the caller's unit of work.
    ///
    /// The caller owns the commit and any alerting afterwards.
    pub async fn adjust_in(&self, tx: &mut S::Tx, id: MenuItemId, delta: i32) -> Result<MenuItem> {
        let mut item = tx
            .lock_menu_item(id)
            .await?
            .ok_or_else(|| DomainError::not_found("menu item", id))?;

        let new_stock = item
            .stock
            .checked_add(delta)
            .ok_or_else(|| DomainError::bad_input("stock change out of range"))?;
        if new_stock < 0 {
            return Err(DomainError::InsufficientStock {
                menu_item_id: id,
                name: item.name,
                requested: -i64::from(delta),
                available: item.stock,
            });
        }

        tx.update_stock(id, new_stock).await?;
        item.stock = new_stock;
        Ok(item)
    }

    /// Sends a stock alert for `item` if it is below the threshold. Delivery
    /// failures are logged only.
    pub async fn alert_if_low(&self, item: &MenuItem) {
        if !self.is_low(item) {
            return;
        }
        metrics::counter!("stock_low_alerts_total").increment(1);
        info!(menu_item_id = %item.id, stock = item.stock, "Low stock");
        notifications::broadcast(
            self.notifier.as_ref(),
            StaffTopic::StockAlerts,
            notifications::stock_alert_payload(item),
        )
        .await;
    }
}
