//! Order repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist an order and its items as one atomic unit.
//! - Reconstruct orders for a batch of ids with two queries and an
//!   in-memory join.
//!
//! # Invariants
//! - `save` either commits the header and every item row, or leaves no row
//!   behind. A failed rollback is reported together with its cause.
//! - `get` never errors on unknown ids; they are simply absent.
//! - The store never computes derived totals; callers aggregate.
//! - Item rows keep insertion order within their order.

use crate::context::{ContextError, OpContext};
use crate::db::{unwatch, ConnectionPool, DbError};
use crate::model::order::{Item, Order, OrderId, OrderStatus, PaymentType};
use log::{error, info, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// SQLite default for `SQLITE_MAX_VARIABLE_NUMBER` in bundled builds.
const MAX_BIND_VARIABLES: usize = 32_766;
const ITEM_COLUMNS: usize = 4;
const ITEM_ROWS_PER_INSERT: usize = MAX_BIND_VARIABLES / ITEM_COLUMNS;

pub type OrderRepoResult<T> = Result<T, OrderRepoError>;

/// Repository error for order persistence and query operations.
#[derive(Debug)]
pub enum OrderRepoError {
    /// Pool, connection or statement failure (including constraint violations).
    Db(DbError),
    /// Caller context finished before the operation completed.
    Interrupted(ContextError),
    /// Value cannot be bound to or read back from storage.
    InvalidData(String),
    /// Commit failed; durability of the write is indeterminate.
    Commit(DbError),
    /// Rollback after `cause` failed as well.
    RollbackFailed {
        cause: Box<OrderRepoError>,
        rollback: DbError,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for OrderRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Interrupted(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid order data: {message}"),
            Self::Commit(err) => write!(f, "can't commit order transaction: {err}"),
            Self::RollbackFailed { cause, rollback } => {
                write!(f, "rollback failed: {rollback}; original error: {cause}")
            }
            Self::MissingRequiredTable(table) => {
                write!(f, "order repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "order repository requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for OrderRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) | Self::Commit(err) => Some(err),
            Self::Interrupted(err) => Some(err),
            Self::RollbackFailed { cause, .. } => Some(cause.as_ref()),
            Self::InvalidData(_)
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<DbError> for OrderRepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Interrupted(reason) => Self::Interrupted(reason),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for OrderRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ContextError> for OrderRepoError {
    fn from(value: ContextError) -> Self {
        Self::Interrupted(value)
    }
}

/// Orders keyed by id, iterated in the order their headers were loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderSet {
    ids: Vec<OrderId>,
    orders: HashMap<OrderId, Order>,
}

impl OrderSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            orders: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts or replaces an order. Replacing keeps the original position.
    pub fn insert(&mut self, order: Order) {
        let id = order.id;
        if self.orders.insert(id, order).is_none() {
            self.ids.push(id);
        }
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&id)
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Ids in load order.
    pub fn ids(&self) -> &[OrderId] {
        &self.ids
    }

    /// Orders in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Order> + '_ {
        self.ids.iter().filter_map(|id| self.orders.get(id))
    }

    /// Mutable access to every order, in no particular order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Order> + '_ {
        self.orders.values_mut()
    }

    /// Consumes the set into a vector in load order.
    pub fn into_vec(mut self) -> Vec<Order> {
        self.ids
            .iter()
            .filter_map(|id| self.orders.remove(id))
            .collect()
    }
}

impl IntoIterator for OrderSet {
    type Item = Order;
    type IntoIter = std::vec::IntoIter<Order>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

/// Repository interface for order persistence.
pub trait OrderRepository {
    /// Persists a new order with its items atomically.
    ///
    /// Any incoming `order.id` is ignored. On success the assigned id is
    /// written to `order.id` and every `item.order_id`, and returned.
    fn save(&self, ctx: &OpContext, order: &mut Order) -> OrderRepoResult<OrderId>;

    /// Loads the existing orders among `ids`, items attached, totals untouched.
    fn get(&self, ctx: &OpContext, ids: &[OrderId]) -> OrderRepoResult<OrderSet>;
}

/// SQLite-backed order repository over a shared connection pool.
#[derive(Clone)]
pub struct SqliteOrderRepository {
    pool: Arc<ConnectionPool>,
}

struct SavedHeader {
    id: OrderId,
    status: OrderStatus,
    created_at: String,
}

impl SqliteOrderRepository {
    /// Constructs a repository after verifying the pool's schema.
    pub fn try_new(pool: Arc<ConnectionPool>) -> OrderRepoResult<Self> {
        {
            let conn = pool.get(&OpContext::background())?;
            ensure_connection_ready(&conn)?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn save_in_tx(&self, ctx: &OpContext, order: &Order) -> OrderRepoResult<SavedHeader> {
        let mut conn = self.pool.get(ctx)?;
        conn.watch(ctx);
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| interrupted_or(ctx, err))?;

        match insert_order_rows(&tx, ctx, order) {
            Ok(header) => {
                tx.commit()
                    .map_err(|err| OrderRepoError::Commit(DbError::from(err)))?;
                Ok(header)
            }
            Err(cause) => {
                // SQLite already rolled back after interrupt, full, ioerr or nomem.
                if tx.is_autocommit() {
                    return Err(cause);
                }
                unwatch(&tx);
                match tx.rollback() {
                    Ok(()) => Err(cause),
                    Err(rollback) => Err(OrderRepoError::RollbackFailed {
                        cause: Box::new(cause),
                        rollback: DbError::from(rollback),
                    }),
                }
            }
        }
    }

    fn load(&self, ctx: &OpContext, ids: &[i64]) -> OrderRepoResult<OrderSet> {
        let conn = self.pool.get(ctx)?;
        conn.watch(ctx);

        let mut orders = OrderSet::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BIND_VARIABLES) {
            load_headers(&conn, ctx, chunk, &mut orders)?;
        }
        if orders.is_empty() {
            return Ok(orders);
        }

        let mut orphans = 0usize;
        for chunk in ids.chunks(MAX_BIND_VARIABLES) {
            orphans += load_items(&conn, ctx, chunk, &mut orders)?;
        }
        if orphans > 0 {
            warn!(
                "event=order_items_orphan module=repo status=skipped req={} rows={}",
                ctx.log_id(),
                orphans
            );
        }

        Ok(orders)
    }
}

impl OrderRepository for SqliteOrderRepository {
    fn save(&self, ctx: &OpContext, order: &mut Order) -> OrderRepoResult<OrderId> {
        let started_at = Instant::now();
        info!(
            "event=order_save module=repo status=start req={} items={}",
            ctx.log_id(),
            order.items.len()
        );

        match self.save_in_tx(ctx, order) {
            Ok(header) => {
                order.assign_id(header.id);
                order.status = header.status;
                order.created_at = Some(header.created_at);
                info!(
                    "event=order_save module=repo status=ok req={} order_id={} items={} duration_ms={}",
                    ctx.log_id(),
                    header.id,
                    order.items.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(header.id)
            }
            Err(err) => {
                error!(
                    "event=order_save module=repo status=error req={} duration_ms={} error={}",
                    ctx.log_id(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn get(&self, ctx: &OpContext, ids: &[OrderId]) -> OrderRepoResult<OrderSet> {
        let started_at = Instant::now();
        let db_ids = normalize_ids(ids);
        if db_ids.is_empty() {
            return Ok(OrderSet::default());
        }
        info!(
            "event=order_get module=repo status=start req={} requested={}",
            ctx.log_id(),
            db_ids.len()
        );

        match self.load(ctx, &db_ids) {
            Ok(orders) => {
                info!(
                    "event=order_get module=repo status=ok req={} requested={} found={} duration_ms={}",
                    ctx.log_id(),
                    db_ids.len(),
                    orders.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(orders)
            }
            Err(err) => {
                error!(
                    "event=order_get module=repo status=error req={} duration_ms={} error={}",
                    ctx.log_id(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}

fn insert_order_rows(
    tx: &Transaction<'_>,
    ctx: &OpContext,
    order: &Order,
) -> OrderRepoResult<SavedHeader> {
    ctx.check()?;
    let status = match order.status {
        OrderStatus::Unknown => OrderStatus::Created,
        other => other,
    };

    let (id, created_at): (i64, String) = tx
        .query_row(
            "INSERT INTO orders (user_id, payment_type, status, created_at)
             VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
             RETURNING id, created_at;",
            params![
                to_db_int(order.user_id, "orders.user_id")?,
                payment_type_to_db(order.payment_type),
                status_to_db(status),
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|err| interrupted_or(ctx, err))?;

    for chunk in order.items.chunks(ITEM_ROWS_PER_INSERT) {
        ctx.check()?;
        insert_items(tx, ctx, id, chunk)?;
    }

    Ok(SavedHeader {
        id: from_db_int(id, "orders.id")?,
        status,
        created_at,
    })
}

/// Inserts `items` as one multi-row statement.
fn insert_items(
    tx: &Transaction<'_>,
    ctx: &OpContext,
    order_id: i64,
    items: &[Item],
) -> OrderRepoResult<()> {
    let mut sql = String::from(
        "INSERT INTO order_items (order_id, item_id, amount, discounted_amount) VALUES ",
    );
    let mut bind_values: Vec<Value> = Vec::with_capacity(items.len() * ITEM_COLUMNS);
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            sql.push_str(", ");
        }
        sql.push_str("(?, ?, ?, ?)");
        bind_values.push(Value::Integer(order_id));
        bind_values.push(Value::Integer(to_db_int(item.id, "order_items.item_id")?));
        bind_values.push(Value::Integer(to_db_int(item.amount, "order_items.amount")?));
        bind_values.push(Value::Integer(to_db_int(
            item.discounted_amount,
            "order_items.discounted_amount",
        )?));
    }

    tx.execute(&sql, params_from_iter(bind_values))
        .map_err(|err| interrupted_or(ctx, err))?;
    Ok(())
}

fn load_headers(
    conn: &Connection,
    ctx: &OpContext,
    ids: &[i64],
    orders: &mut OrderSet,
) -> OrderRepoResult<()> {
    ctx.check()?;
    let sql = format!(
        "SELECT id, user_id, payment_type, status, created_at
         FROM orders
         WHERE id IN ({})
         ORDER BY id ASC;",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql).map_err(|err| interrupted_or(ctx, err))?;
    let mut rows = stmt
        .query(params_from_iter(ids.iter()))
        .map_err(|err| interrupted_or(ctx, err))?;
    while let Some(row) = rows.next().map_err(|err| interrupted_or(ctx, err))? {
        orders.insert(parse_order_row(row)?);
    }
    Ok(())
}

/// Attaches item rows to their orders. Returns the number of orphan rows.
fn load_items(
    conn: &Connection,
    ctx: &OpContext,
    ids: &[i64],
    orders: &mut OrderSet,
) -> OrderRepoResult<usize> {
    ctx.check()?;
    let sql = format!(
        "SELECT order_id, item_id, amount, discounted_amount
         FROM order_items
         WHERE order_id IN ({})
         ORDER BY id ASC;",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql).map_err(|err| interrupted_or(ctx, err))?;
    let mut rows = stmt
        .query(params_from_iter(ids.iter()))
        .map_err(|err| interrupted_or(ctx, err))?;

    let mut orphans = 0;
    while let Some(row) = rows.next().map_err(|err| interrupted_or(ctx, err))? {
        let item = parse_item_row(row)?;
        match orders.get_mut(item.order_id) {
            Some(order) => order.items.push(item),
            None => orphans += 1,
        }
    }
    Ok(orphans)
}

fn parse_order_row(row: &Row<'_>) -> OrderRepoResult<Order> {
    let payment_text: String = row.get("payment_type")?;
    let payment_type = parse_payment_type(&payment_text).ok_or_else(|| {
        OrderRepoError::InvalidData(format!(
            "invalid payment type `{payment_text}` in orders.payment_type"
        ))
    })?;

    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text).ok_or_else(|| {
        OrderRepoError::InvalidData(format!("invalid status `{status_text}` in orders.status"))
    })?;

    Ok(Order {
        id: from_db_int(row.get("id")?, "orders.id")?,
        status,
        user_id: from_db_int(row.get("user_id")?, "orders.user_id")?,
        payment_type,
        original_amount: 0,
        discounted_amount: 0,
        created_at: Some(row.get("created_at")?),
        items: Vec::new(),
    })
}

fn parse_item_row(row: &Row<'_>) -> OrderRepoResult<Item> {
    Ok(Item {
        order_id: from_db_int(row.get("order_id")?, "order_items.order_id")?,
        id: from_db_int(row.get("item_id")?, "order_items.item_id")?,
        amount: from_db_int(row.get("amount")?, "order_items.amount")?,
        discounted_amount: from_db_int(
            row.get("discounted_amount")?,
            "order_items.discounted_amount",
        )?,
    })
}

/// Deduplicates and sorts ids; ids beyond the SQLite integer range cannot
/// exist and are dropped.
fn normalize_ids(ids: &[OrderId]) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(ids.len());
    let mut db_ids: Vec<i64> = ids
        .iter()
        .filter_map(|id| i64::try_from(*id).ok())
        .filter(|id| seen.insert(*id))
        .collect();
    db_ids.sort_unstable();
    db_ids
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Prefers the context reason when a statement failed because it was
/// interrupted.
fn interrupted_or(ctx: &OpContext, err: rusqlite::Error) -> OrderRepoError {
    match ctx.check() {
        Err(reason) => OrderRepoError::Interrupted(reason),
        Ok(()) => OrderRepoError::from(err),
    }
}

fn to_db_int(value: u64, column: &str) -> OrderRepoResult<i64> {
    i64::try_from(value).map_err(|_| {
        OrderRepoError::InvalidData(format!(
            "value `{value}` for {column} exceeds the SQLite integer range"
        ))
    })
}

fn from_db_int(value: i64, column: &str) -> OrderRepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| OrderRepoError::InvalidData(format!("negative value `{value}` in {column}")))
}

fn payment_type_to_db(payment_type: PaymentType) -> &'static str {
    match payment_type {
        PaymentType::Unknown => "unknown",
        PaymentType::Card => "card",
        PaymentType::Wallet => "wallet",
    }
}

fn parse_payment_type(value: &str) -> Option<PaymentType> {
    match value {
        "unknown" => Some(PaymentType::Unknown),
        "card" => Some(PaymentType::Card),
        "wallet" => Some(PaymentType::Wallet),
        _ => None,
    }
}

fn status_to_db(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Unknown => "unknown",
        OrderStatus::Created => "created",
        OrderStatus::Processed => "processed",
        OrderStatus::Canceled => "canceled",
    }
}

fn parse_status(value: &str) -> Option<OrderStatus> {
    match value {
        "unknown" => Some(OrderStatus::Unknown),
        "created" => Some(OrderStatus::Created),
        "processed" => Some(OrderStatus::Processed),
        "canceled" => Some(OrderStatus::Canceled),
        _ => None,
    }
}

fn ensure_connection_ready(conn: &Connection) -> OrderRepoResult<()> {
    let required: [(&'static str, &[&'static str]); 2] = [
        (
            "orders",
            &["id", "user_id", "payment_type", "status", "created_at"],
        ),
        (
            "order_items",
            &["id", "order_id", "item_id", "amount", "discounted_amount"],
        ),
    ];

    for (table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(OrderRepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(OrderRepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> OrderRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> OrderRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
