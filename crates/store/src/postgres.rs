use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MenuItemId, Money, OrderId, OrderStatus, StudentId};
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Balance, MenuItem, Order, OrderLineItem, OrderQuery, Result, RfidMapping, Student, StoreError,
    TransactionRecord,
    store::{CanteenStore, StoreTx},
};

const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

const ORDER_COLUMNS: &str = "id, student_id, total_amount_cents, status, created_at, updated_at";
const MENU_ITEM_COLUMNS: &str = "id, name, price_cents, stock, tags, created_at";

/// PostgreSQL-backed store.
///
/// Rows read through the `lock_*` methods of [`PostgresTx`] are fetched with
/// `SELECT ... FOR UPDATE`, so conflicting units of work queue on the row.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

/// Unit of work over a [`PostgresStore`].
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

fn map_write_error(table: &'static str, key: impl Into<String>, e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                tracing::debug!(table, constraint = ?db_err.constraint(), "duplicate key");
                return StoreError::DuplicateKey {
                    table,
                    key: key.into(),
                };
            }
            Some(CHECK_VIOLATION) => {
                tracing::warn!(
                    table,
                    constraint = ?db_err.constraint(),
                    "check constraint violated"
                );
                return StoreError::ConstraintViolation(db_err.message().to_string());
            }
            _ => {}
        }
    }
    StoreError::Database(e)
}

fn row_to_student(row: PgRow) -> Result<Student> {
    Ok(Student {
        id: StudentId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        device_token: row.try_get("device_token")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_menu_item(row: PgRow) -> Result<MenuItem> {
    Ok(MenuItem {
        id: MenuItemId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: row.try_get("stock")?,
        tags: row.try_get("tags")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_balance(row: PgRow) -> Result<Balance> {
    Ok(Balance {
        student_id: StudentId::from_uuid(row.try_get("student_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_transaction(row: PgRow) -> Result<TransactionRecord> {
    Ok(TransactionRecord {
        student_id: StudentId::from_uuid(row.try_get("student_id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_order(row: &PgRow, items: Vec<OrderLineItem>) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id")?),
        student_id: StudentId::from_uuid(row.try_get("student_id")?),
        items,
        total: Money::from_cents(row.try_get("total_amount_cents")?),
        status: status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::CorruptRow(e.to_string()))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Loads line items for the given orders, keyed by order id, in position order.
async fn load_line_items<'e, E>(
    executor: E,
    order_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<OrderLineItem>>>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, order_id, menu_item_id, quantity, price_cents
        FROM order_line_items
        WHERE order_id = ANY($1)
        ORDER BY order_id, position ASC
        "#,
    )
    .bind(order_ids)
    .fetch_all(executor)
    .await?;

    let mut items: HashMap<Uuid, Vec<OrderLineItem>> = HashMap::new();
    for row in rows {
        let quantity: i32 = row.try_get("quantity")?;
        let item = OrderLineItem {
            id: row.try_get("id")?,
            menu_item_id: MenuItemId::from_uuid(row.try_get("menu_item_id")?),
            quantity: u32::try_from(quantity)
                .map_err(|_| StoreError::CorruptRow(format!("line quantity {quantity}")))?,
            unit_price: Money::from_cents(row.try_get("price_cents")?),
        };
        items
            .entry(row.try_get("order_id")?)
            .or_default()
            .push(item);
    }
    Ok(items)
}

fn assemble_orders(
    rows: Vec<PgRow>,
    mut items: HashMap<Uuid, Vec<OrderLineItem>>,
) -> Result<Vec<Order>> {
    rows.iter()
        .map(|row| {
            let id: Uuid = row.try_get("id")?;
            row_to_order(row, items.remove(&id).unwrap_or_default())
        })
        .collect()
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn get_student(&mut self, id: StudentId) -> Result<Option<Student>> {
        let row = sqlx::query(
            "SELECT id, name, email, device_token, created_at FROM students WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_student).transpose()
    }

    async fn lock_menu_item(&mut self, id: MenuItemId) -> Result<Option<MenuItem>> {
        let row = sqlx::query(&format!(
            "SELECT {MENU_ITEM_COLUMNS} FROM menu_items WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_menu_item).transpose()
    }

    async fn update_stock(&mut self, id: MenuItemId, stock: i32) -> Result<()> {
        let result = sqlx::query("UPDATE menu_items SET stock = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(stock)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error("menu_items", id.to_string(), e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                table: "menu_items",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    async fn lock_balance(&mut self, student_id: StudentId) -> Result<Option<Balance>> {
        let row = sqlx::query(
            "SELECT student_id, amount_cents, updated_at FROM balances WHERE student_id = $1 FOR UPDATE",
        )
        .bind(student_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(row_to_balance).transpose()
    }

    async fn update_balance(
        &mut self,
        student_id: StudentId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE balances SET amount_cents = $2, updated_at = $3 WHERE student_id = $1",
        )
        .bind(student_id.as_uuid())
        .bind(amount.cents())
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_write_error("balances", student_id.to_string(), e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                table: "balances",
                key: student_id.to_string(),
            });
        }
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut items = load_line_items(&mut *self.tx, &[id.as_uuid()]).await?;
        row_to_order(&row, items.remove(&id.as_uuid()).unwrap_or_default()).map(Some)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, student_id, total_amount_cents, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.student_id.as_uuid())
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_write_error("orders", order.id.to_string(), e))?;

        for (position, item) in order.items.iter().enumerate() {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                StoreError::ConstraintViolation(format!("line quantity {}", item.quantity))
            })?;
            sqlx::query(
                r#"
                INSERT INTO order_line_items (id, order_id, position, menu_item_id, quantity, price_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id)
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(item.menu_item_id.as_uuid())
            .bind(quantity)
            .bind(item.unit_price.cents())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_write_error("order_line_items", item.id.to_string(), e))?;
        }
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound {
                table: "orders",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_transaction(&mut self, record: &TransactionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (student_id, order_id, amount_cents, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.student_id.as_uuid())
        .bind(record.order_id.as_uuid())
        .bind(record.amount.cents())
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            map_write_error(
                "transactions",
                format!("({}, {})", record.student_id, record.order_id),
                e,
            )
        })?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CanteenStore for PostgresStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx> {
        Ok(PostgresTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>> {
        let row = sqlx::query(
            "SELECT id, name, email, device_token, created_at FROM students WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_student).transpose()
    }

    async fn set_device_token(&self, id: StudentId, token: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE students SET device_token = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_menu_item(&self, id: MenuItemId) -> Result<Option<MenuItem>> {
        let row = sqlx::query(&format!(
            "SELECT {MENU_ITEM_COLUMNS} FROM menu_items WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_menu_item).transpose()
    }

    async fn get_balance(&self, student_id: StudentId) -> Result<Option<Balance>> {
        let row = sqlx::query(
            "SELECT student_id, amount_cents, updated_at FROM balances WHERE student_id = $1",
        )
        .bind(student_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_balance).transpose()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut items = load_line_items(&self.pool, &[id.as_uuid()]).await?;
        row_to_order(&row, items.remove(&id.as_uuid()).unwrap_or_default()).map(Some)
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        if query.student_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND student_id = ${param_count}"));
        }
        if query.statuses.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ANY(${param_count})"));
        }

        if query.newest_first {
            sql.push_str(" ORDER BY created_at DESC, id DESC");
        } else {
            sql.push_str(" ORDER BY created_at ASC, id ASC");
        }

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(student_id) = query.student_id {
            sqlx_query = sqlx_query.bind(student_id.as_uuid());
        }
        if let Some(statuses) = query.statuses {
            let names: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(names);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let items = load_line_items(&self.pool, &ids).await?;
        assemble_orders(rows, items)
    }

    async fn list_transactions(
        &self,
        student_id: Option<StudentId>,
    ) -> Result<Vec<TransactionRecord>> {
        let rows = match student_id {
            Some(id) => {
                sqlx::query(
                    r#"
                    SELECT student_id, order_id, amount_cents, created_at
                    FROM transactions
                    WHERE student_id = $1
                    ORDER BY created_at ASC
                    "#,
                )
                .bind(id.as_uuid())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT student_id, order_id, amount_cents, created_at
                    FROM transactions
                    ORDER BY created_at ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(row_to_transaction).collect()
    }

    async fn sum_transactions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Money> {
        let sum: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)::BIGINT
            FROM transactions
            WHERE created_at >= $1 AND created_at < $2
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::from_cents(sum))
    }

    async fn get_rfid_mapping(&self, tag_id: &str) -> Result<Option<RfidMapping>> {
        let row = sqlx::query(
            "SELECT tag_id, student_id, created_at FROM rfid_mappings WHERE tag_id = $1",
        )
        .bind(tag_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(RfidMapping {
                tag_id: row.try_get("tag_id")?,
                student_id: StudentId::from_uuid(row.try_get("student_id")?),
                created_at: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn upsert_rfid_mapping(&self, mapping: &RfidMapping) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rfid_mappings (tag_id, student_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (tag_id) DO UPDATE SET
                student_id = EXCLUDED.student_id,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&mapping.tag_id)
        .bind(mapping.student_id.as_uuid())
        .bind(mapping.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_student(&self, student: &Student) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO students (id, name, email, device_token, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(student.id.as_uuid())
        .bind(&student.name)
        .bind(&student.email)
        .bind(&student.device_token)
        .bind(student.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error("students", student.id.to_string(), e))?;
        Ok(())
    }

    async fn insert_menu_item(&self, item: &MenuItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO menu_items (id, name, price_cents, stock, tags, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.price.cents())
        .bind(item.stock)
        .bind(&item.tags)
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error("menu_items", item.name.clone(), e))?;
        Ok(())
    }

    async fn insert_balance(&self, balance: &Balance) -> Result<()> {
        sqlx::query(
            "INSERT INTO balances (student_id, amount_cents, updated_at) VALUES ($1, $2, $3)",
        )
        .bind(balance.student_id.as_uuid())
        .bind(balance.amount.cents())
        .bind(balance.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error("balances", balance.student_id.to_string(), e))?;
        Ok(())
    }
}
