use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{MenuItemId, Money, OrderId, OrderStatus, StudentId};
use notify::{NotificationDispatcher, StaffTopic};
use store::{CanteenStore, MenuItem, Order, OrderLineItem, OrderQuery, StoreTx};
use tracing::{info, warn};

use super::types::{DispatchOutcome, OrderLine, OrderOutcome};
use crate::error::{DomainError, Result};
use crate::ledger::BalanceLedger;
use crate::notifications;
use crate::rfid::RfidLookup;
use crate::stock::StockManager;
use crate::transactions::TransactionRecorder;

/// Orchestrates order creation and status transitions.
///
/// This is the only component that drives stock, balance and transaction
/// changes together. Creation runs in one unit of work: stock deductions,
/// the balance debit, the order row and its transaction all commit or none
/// do. Notifications go out after commit and never undo it.
pub struct OrderWorkflow<S: CanteenStore> {
    pub(super) store: S,
    stock: StockManager<S>,
    ledger: BalanceLedger<S>,
    pub(super) transactions: TransactionRecorder<S>,
    rfid: Arc<dyn RfidLookup>,
    pub(super) notifier: Arc<dyn NotificationDispatcher>,
}

impl<S: CanteenStore + Clone> OrderWorkflow<S> {
    pub fn new(
        store: S,
        notifier: Arc<dyn NotificationDispatcher>,
        rfid: Arc<dyn RfidLookup>,
    ) -> Self {
        Self {
            stock: StockManager::new(store.clone(), notifier.clone()),
            ledger: BalanceLedger::new(store.clone()),
            transactions: TransactionRecorder::new(store.clone()),
            store,
            rfid,
            notifier,
        }
    }
}

impl<S: CanteenStore> OrderWorkflow<S> {
    pub fn with_low_stock_threshold(mut self, threshold: i32) -> Self {
        self.stock = self.stock.with_low_stock_threshold(threshold);
        self
    }

    pub fn stock(&self) -> &StockManager<S> {
        &self.stock
    }

    pub fn ledger(&self) -> &BalanceLedger<S> {
        &self.ledger
    }

    pub fn transactions(&self) -> &TransactionRecorder<S> {
        &self.transactions
    }

    /// Places a paid order for `student_id`.
    ///
    /// Fails with `NotFound`, `InsufficientStock` or `InsufficientBalance`
    /// before anything is written.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn create_order(
        &self,
        student_id: StudentId,
        lines: Vec<OrderLine>,
    ) -> Result<OrderOutcome> {
        let started = Instant::now();
        let result = self.place_order(student_id, &lines).await;
        metrics::histogram!("order_create_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let (order, low_stock) = match result {
            Ok(placed) => placed,
            Err(e) => {
                metrics::counter!("orders_rejected_total", "reason" => e.code()).increment(1);
                info!(error = %e, "Order rejected");
                return Err(e);
            }
        };
        metrics::counter!("orders_created_total").increment(1);
        info!(order_id = %order.id, total = %order.total, "Order placed");

        let warning = notifications::broadcast(
            self.notifier.as_ref(),
            StaffTopic::NewOrders,
            notifications::new_order_payload(order.id),
        )
        .await;
        for item in &low_stock {
            self.stock.alert_if_low(item).await;
        }

        Ok(OrderOutcome { order, warning })
    }

    async fn place_order(
        &self,
        student_id: StudentId,
        lines: &[OrderLine],
    ) -> Result<(Order, Vec<MenuItem>)> {
        // Ascending id order doubles as the row lock order.
        let requested = requested_quantities(lines)?;

        let mut tx = self.store.begin().await?;
        tx.get_student(student_id)
            .await?
            .ok_or_else(|| DomainError::not_found("student", student_id))?;

        let mut items = BTreeMap::new();
        for (&id, &quantity) in &requested {
            let item = tx
                .lock_menu_item(id)
                .await?
                .ok_or_else(|| DomainError::not_found("menu item", id))?;
            if i64::from(quantity) > i64::from(item.stock) {
                return Err(DomainError::InsufficientStock {
                    menu_item_id: id,
                    name: item.name,
                    requested: i64::from(quantity),
                    available: item.stock,
                });
            }
            items.insert(id, item);
        }

        let mut line_items = Vec::with_capacity(lines.len());
        let mut total = Money::zero();
        for line in lines {
            let unit_price = items
                .get(&line.menu_item_id)
                .map(|item| item.price)
                .ok_or_else(|| DomainError::not_found("menu item", line.menu_item_id))?;
            let line_item = OrderLineItem::new(line.menu_item_id, line.quantity, unit_price);
            total = line_item
                .line_total()
                .and_then(|line_total| total.checked_add(line_total))
                .ok_or_else(|| DomainError::bad_input("order total out of range"))?;
            line_items.push(line_item);
        }

        let balance = tx
            .lock_balance(student_id)
            .await?
            .ok_or_else(|| DomainError::not_found("balance", student_id))?;
        if balance.amount < total {
            return Err(DomainError::InsufficientBalance {
                required: total,
                available: balance.amount,
            });
        }

        let mut low_stock = Vec::new();
        for (&id, &quantity) in &requested {
            let delta = i32::try_from(quantity)
                .map_err(|_| DomainError::bad_input("quantity out of range"))?;
            let item = self.stock.adjust_in(&mut tx, id, -delta).await?;
            if self.stock.is_low(&item) {
                low_stock.push(item);
            }
        }
        if total.is_positive() {
            self.ledger.debit_in(&mut tx, student_id, total).await?;
        }

        let now = Utc::now();
        let order = Order {
            id: OrderId::new(),
            student_id,
            items: line_items,
            total,
            status: OrderStatus::Paid,
            created_at: now,
            updated_at: now,
        };
        tx.insert_order(&order).await?;
        self.transactions
            .append_in(&mut tx, student_id, order.id, total)
            .await?;
        tx.commit().await?;

        Ok((order, low_stock))
    }

    /// Sets an order's status without checking the transition.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = lock_order(&mut tx, order_id).await?;
        order.status = status;
        order.updated_at = Utc::now();
        tx.update_order_status(order_id, status, order.updated_at)
            .await?;
        tx.commit().await?;

        record_transition(status);
        info!(order_id = %order_id, status = %status, "Order status updated");
        Ok(order)
    }

    /// Moves a paid order to awaiting confirmation and pushes the owner.
    #[tracing::instrument(skip(self))]
    pub async fn dispatch(&self, order_id: OrderId) -> Result<DispatchOutcome> {
        let mut tx = self.store.begin().await?;
        let mut order = lock_order(&mut tx, order_id).await?;
        if !order.status.can_dispatch() {
            return Err(DomainError::InvalidState {
                order_id,
                status: order.status,
                action: "dispatch",
            });
        }
        let owner = tx.get_student(order.student_id).await?;

        order.status = OrderStatus::AwaitingConfirmation;
        order.updated_at = Utc::now();
        tx.update_order_status(order_id, order.status, order.updated_at)
            .await?;
        tx.commit().await?;

        record_transition(order.status);
        info!(order_id = %order_id, "Order dispatched");

        let device_token = owner.as_ref().and_then(|s| s.device_token.as_deref());
        let warning = notifications::push(
            self.notifier.as_ref(),
            device_token,
            notifications::ready_for_collection(order_id),
        )
        .await;
        if let Some(warning) = &warning {
            warn!(order_id = %order_id, warning = %warning, "Owner not notified");
        }

        Ok(DispatchOutcome { order, warning })
    }

    /// Completes an order on behalf of its owner.
    ///
    /// Ownership is checked before the status, so a stranger always gets
    /// `Forbidden`.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_collection(
        &self,
        order_id: OrderId,
        requester: StudentId,
    ) -> Result<OrderOutcome> {
        let mut tx = self.store.begin().await?;
        let mut order = lock_order(&mut tx, order_id).await?;
        if order.student_id != requester {
            return Err(DomainError::Forbidden(format!(
                "order {order_id} belongs to another student"
            )));
        }
        if !order.status.can_confirm_collection() {
            return Err(DomainError::InvalidState {
                order_id,
                status: order.status,
                action: "confirm collection",
            });
        }

        order.status = OrderStatus::Completed;
        order.updated_at = Utc::now();
        tx.update_order_status(order_id, order.status, order.updated_at)
            .await?;
        tx.commit().await?;

        record_transition(order.status);
        info!(order_id = %order_id, "Collection confirmed");

        let warning = notifications::broadcast(
            self.notifier.as_ref(),
            StaffTopic::OrderConfirmations,
            notifications::confirmation_payload(order_id),
        )
        .await;

        Ok(OrderOutcome { order, warning })
    }

    /// Finds the newest active order of the student a tag belongs to.
    #[tracing::instrument(skip(self))]
    pub async fn lookup_by_rfid(&self, tag_id: &str) -> Result<Order> {
        let student_id = self
            .rfid
            .student_for_tag(tag_id)
            .await?
            .ok_or_else(|| DomainError::not_found("rfid mapping", tag_id))?;

        let query = OrderQuery::for_student(student_id)
            .statuses(OrderStatus::active())
            .newest_first()
            .limit(1);
        self.store
            .query_orders(query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::not_found("active order", tag_id))
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", order_id))
    }

    /// Lists every order, newest first.
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.store.query_orders(OrderQuery::new().newest_first()).await?)
    }

    /// Lists one student's orders, newest first.
    pub async fn list_orders_for(&self, student_id: StudentId) -> Result<Vec<Order>> {
        let query = OrderQuery::for_student(student_id).newest_first();
        Ok(self.store.query_orders(query).await?)
    }
}

/// Sums quantities per menu item, rejecting empty orders and zero lines.
fn requested_quantities(lines: &[OrderLine]) -> Result<BTreeMap<MenuItemId, u32>> {
    if lines.is_empty() {
        return Err(DomainError::bad_input("order must contain at least one item"));
    }
    let mut requested = BTreeMap::new();
    for line in lines {
        if line.quantity == 0 {
            return Err(DomainError::bad_input("quantity must be at least 1"));
        }
        let quantity: &mut u32 = requested.entry(line.menu_item_id).or_default();
        *quantity = quantity
            .checked_add(line.quantity)
            .ok_or_else(|| DomainError::bad_input("quantity out of range"))?;
    }
    Ok(requested)
}

pub(super) async fn lock_order<T: StoreTx>(tx: &mut T, order_id: OrderId) -> Result<Order> {
    tx.lock_order(order_id)
        .await?
        .ok_or_else(|| DomainError::not_found("order", order_id))
}

pub(super) fn record_transition(to: OrderStatus) {
    metrics::counter!("order_status_transitions_total", "to" => to.as_str()).increment(1);
}
