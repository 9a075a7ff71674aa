//! Order use-case service.
//!
//! # Responsibility
//! - Validate caller input before it reaches the store.
//! - Apply derived totals to orders read back from the store.
//! - Report the outcome of every store call to the metrics sink.
//!
//! # Invariants
//! - Totals are recomputed from items on every read.
//! - The store is never called with an empty id list or an invalid order.

use crate::context::OpContext;
use crate::metrics::{
    MetricsSink, GET_ORDERS_COUNT, GET_ORDERS_ERROR, GET_ORDERS_SUCCESS, SAVE_ORDER_COUNT,
    SAVE_ORDER_ERROR, SAVE_ORDER_SUCCESS,
};
use crate::model::order::{Order, OrderId, OrderValidationError};
use crate::repo::order_repo::{OrderRepoError, OrderRepository, OrderSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for order use-cases.
#[derive(Debug)]
pub enum OrderServiceError {
    /// Order input rejected before persistence.
    Validation(OrderValidationError),
    /// `get_orders` was called without ids.
    EmptyIds,
    /// Persistence-layer failure.
    Repo(OrderRepoError),
}

impl Display for OrderServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "bad request: {err}"),
            Self::EmptyIds => write!(f, "no order ids passed"),
            Self::Repo(err) => write!(f, "err from orders repository: {err}"),
        }
    }
}

impl Error for OrderServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::EmptyIds => None,
        }
    }
}

impl From<OrderValidationError> for OrderServiceError {
    fn from(value: OrderValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<OrderRepoError> for OrderServiceError {
    fn from(value: OrderRepoError) -> Self {
        Self::Repo(value)
    }
}

/// Order service facade over a repository and a metrics sink.
pub struct OrderService<R: OrderRepository, M: MetricsSink> {
    repo: R,
    metrics: M,
}

impl<R: OrderRepository, M: MetricsSink> OrderService<R, M> {
    pub fn new(repo: R, metrics: M) -> Self {
        Self { repo, metrics }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Validates and persists one order; the assigned id is set in place.
    pub fn create_order(
        &self,
        ctx: &OpContext,
        order: &mut Order,
    ) -> Result<OrderId, OrderServiceError> {
        order.validate()?;

        let outcome = self.repo.save(ctx, order);
        self.record(
            outcome.is_ok(),
            SAVE_ORDER_SUCCESS,
            SAVE_ORDER_ERROR,
            SAVE_ORDER_COUNT,
        );
        Ok(outcome?)
    }

    /// Loads orders by id with derived totals applied.
    ///
    /// Unknown ids are omitted; the result follows the store's load order.
    pub fn get_orders(
        &self,
        ctx: &OpContext,
        ids: &[OrderId],
    ) -> Result<Vec<Order>, OrderServiceError> {
        if ids.is_empty() {
            return Err(OrderServiceError::EmptyIds);
        }

        let outcome = self.repo.get(ctx, ids);
        self.record(
            outcome.is_ok(),
            GET_ORDERS_SUCCESS,
            GET_ORDERS_ERROR,
            GET_ORDERS_COUNT,
        );
        let mut orders = outcome?;
        apply_totals(&mut orders);
        Ok(orders.into_vec())
    }

    fn record(&self, ok: bool, success: &'static str, failure: &'static str, total: &'static str) {
        self.metrics.increment(if ok { success } else { failure });
        self.metrics.increment(total);
    }
}

/// Recomputes derived totals for every order in the set.
pub fn apply_totals(orders: &mut OrderSet) {
    for order in orders.values_mut() {
        order.recompute_totals();
    }
}
