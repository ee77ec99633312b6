use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MenuItemId, Money, OrderId, OrderStatus, StudentId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Balance, MenuItem, Order, OrderQuery, Result, RfidMapping, Student, StoreError,
    TransactionRecord,
    store::{CanteenStore, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    students: HashMap<StudentId, Student>,
    menu_items: HashMap<MenuItemId, MenuItem>,
    balances: HashMap<StudentId, Balance>,
    // Insertion order doubles as creation order.
    orders: Vec<Order>,
    transactions: Vec<TransactionRecord>,
    rfid_mappings: HashMap<String, RfidMapping>,
}

impl Tables {
    fn order_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.iter_mut().find(|o| o.id == id)
    }
}

/// In-memory store for tests and local runs.
///
/// Units of work are fully serialised: [`CanteenStore::begin`] takes an owned
/// lock on all tables and stages writes on a copy that replaces the tables on
/// commit. Dropping the unit of work discards the copy.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Returns the total number of transaction records stored.
    pub async fn transaction_count(&self) -> usize {
        self.tables.lock().await.transactions.len()
    }
}

/// Unit of work over an [`InMemoryStore`].
pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn get_student(&mut self, id: StudentId) -> Result<Option<Student>> {
        Ok(self.staged.students.get(&id).cloned())
    }

    async fn lock_menu_item(&mut self, id: MenuItemId) -> Result<Option<MenuItem>> {
        Ok(self.staged.menu_items.get(&id).cloned())
    }

    async fn update_stock(&mut self, id: MenuItemId, stock: i32) -> Result<()> {
        if stock < 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "menu_items.stock must not be negative (item {id})"
            )));
        }
        let item = self
            .staged
            .menu_items
            .get_mut(&id)
            .ok_or_else(|| StoreError::RowNotFound {
                table: "menu_items",
                key: id.to_string(),
            })?;
        item.stock = stock;
        Ok(())
    }

    async fn lock_balance(&mut self, student_id: StudentId) -> Result<Option<Balance>> {
        Ok(self.staged.balances.get(&student_id).cloned())
    }

    async fn update_balance(
        &mut self,
        student_id: StudentId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if amount.is_negative() {
            return Err(StoreError::ConstraintViolation(format!(
                "balances.amount must not be negative (student {student_id})"
            )));
        }
        let balance =
            self.staged
                .balances
                .get_mut(&student_id)
                .ok_or_else(|| StoreError::RowNotFound {
                    table: "balances",
                    key: student_id.to_string(),
                })?;
        balance.amount = amount;
        balance.updated_at = at;
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.staged.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.staged.orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::DuplicateKey {
                table: "orders",
                key: order.id.to_string(),
            });
        }
        self.staged.orders.push(order.clone());
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let order = self
            .staged
            .order_mut(id)
            .ok_or_else(|| StoreError::RowNotFound {
                table: "orders",
                key: id.to_string(),
            })?;
        order.status = status;
        order.updated_at = at;
        Ok(())
    }

    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<()> {
        let exists = self
            .staged
            .transactions
            .iter()
            .any(|t| t.student_id == record.student_id && t.order_id == record.order_id);
        if exists {
            return Err(StoreError::DuplicateKey {
                table: "transactions",
                key: format!("({}, {})", record.student_id, record.order_id),
            });
        }
        self.staged.transactions.push(record.clone());
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let InMemoryTx { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl CanteenStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTx { guard, staged })
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>> {
        Ok(self.tables.lock().await.students.get(&id).cloned())
    }

    async fn set_device_token(&self, id: StudentId, token: &str) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        match tables.students.get_mut(&id) {
            Some(student) => {
                student.device_token = Some(token.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_menu_item(&self, id: MenuItemId) -> Result<Option<MenuItem>> {
        Ok(self.tables.lock().await.menu_items.get(&id).cloned())
    }

    async fn get_balance(&self, student_id: StudentId) -> Result<Option<Balance>> {
        Ok(self.tables.lock().await.balances.get(&student_id).cloned())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let tables = self.tables.lock().await;
        // Stable sort keeps insertion order among equal timestamps.
        let mut orders: Vec<_> = tables
            .orders
            .iter()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        if query.newest_first {
            orders.reverse();
        }
        if let Some(limit) = query.limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }

    async fn list_transactions(
        &self,
        student_id: Option<StudentId>,
    ) -> Result<Vec<TransactionRecord>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<_> = tables
            .transactions
            .iter()
            .filter(|t| student_id.is_none_or(|id| t.student_id == id))
            .cloned()
            .collect();
        records.sort_by_key(|t| t.created_at);
        Ok(records)
    }

    async fn sum_transactions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Money> {
        let tables = self.tables.lock().await;
        Ok(tables
            .transactions
            .iter()
            .filter(|t| t.created_at >= start && t.created_at < end)
            .map(|t| t.amount)
            .sum())
    }

    async fn get_rfid_mapping(&self, tag_id: &str) -> Result<Option<RfidMapping>> {
        Ok(self.tables.lock().await.rfid_mappings.get(tag_id).cloned())
    }

    async fn upsert_rfid_mapping(&self, mapping: &RfidMapping) -> Result<()> {
        self.tables
            .lock()
            .await
            .rfid_mappings
            .insert(mapping.tag_id.clone(), mapping.clone());
        Ok(())
    }

    async fn insert_student(&self, student: &Student) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.students.contains_key(&student.id) {
            return Err(StoreError::DuplicateKey {
                table: "students",
                key: student.id.to_string(),
            });
        }
        tables.students.insert(student.id, student.clone());
        Ok(())
    }

    async fn insert_menu_item(&self, item: &MenuItem) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.menu_items.values().any(|m| m.name == item.name) {
            return Err(StoreError::DuplicateKey {
                table: "menu_items",
                key: item.name.clone(),
            });
        }
        tables.menu_items.insert(item.id, item.clone());
        Ok(())
    }

    async fn insert_balance(&self, balance: &Balance) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.balances.contains_key(&balance.student_id) {
            return Err(StoreError::DuplicateKey {
                table: "balances",
                key: balance.student_id.to_string(),
            });
        }
        tables.balances.insert(balance.student_id, balance.clone());
        Ok(())
    }
}
