use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MenuItemId, Money, OrderId, OrderStatus, StudentId};

use crate::{
    Balance, MenuItem, Order, OrderQuery, Result, RfidMapping, Student, TransactionRecord,
};

/// A unit of work against the store.
///
/// Rows fetched through `lock_*` are held exclusively until [`StoreTx::commit`]
/// or until the unit of work is dropped, which rolls every write back.
#[async_trait]
pub trait StoreTx: Send + Sized {
    async fn get_student(&mut self, id: StudentId) -> Result<Option<Student>>;

    /// Reads a menu item and locks its row.
    async fn lock_menu_item(&mut self, id: MenuItemId) -> Result<Option<MenuItem>>;

    async fn update_stock(&mut self, id: MenuItemId, stock: i32) -> Result<()>;

    /// Reads a balance and locks its row.
    async fn lock_balance(&mut self, student_id: StudentId) -> Result<Option<Balance>>;

    async fn update_balance(
        &mut self,
        student_id: StudentId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Reads an order with its line items and locks the order row.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Inserts an order together with its line items.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Appends a transaction record.
    ///
    /// Fails with `DuplicateKey` if `(student_id, order_id)` already exists.
    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<()>;

    /// Makes every write of this unit of work visible.
    async fn commit(self) -> Result<()>;
}

/// Core trait for datastore implementations.
///
/// Read methods see committed data only and take no locks.
#[async_trait]
pub trait CanteenStore: Send + Sync {
    type Tx: StoreTx + 'static;

    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Self::Tx>;

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>>;

    /// Stores the device token used for push notifications.
    ///
    /// Returns false if the student does not exist.
    async fn set_device_token(&self, id: StudentId, token: &str) -> Result<bool>;

    async fn get_menu_item(&self, id: MenuItemId) -> Result<Option<MenuItem>>;

    async fn get_balance(&self, student_id: StudentId) -> Result<Option<Balance>>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Lists transaction records oldest first, optionally for one student.
    async fn list_transactions(&self, student_id: Option<StudentId>)
    -> Result<Vec<TransactionRecord>>;

    /// Sums transaction amounts with `start <= created_at < end`.
    async fn sum_transactions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Money>;

    async fn get_rfid_mapping(&self, tag_id: &str) -> Result<Option<RfidMapping>>;

    /// Inserts a mapping, replacing any existing mapping for the same tag.
    async fn upsert_rfid_mapping(&self, mapping: &RfidMapping) -> Result<()>;

    async fn insert_student(&self, student: &Student) -> Result<()>;

    async fn insert_menu_item(&self, item: &MenuItem) -> Result<()>;

    async fn insert_balance(&self, balance: &Balance) -> Result<()>;
}
