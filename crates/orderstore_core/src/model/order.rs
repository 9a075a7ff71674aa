//! Order domain model.
//!
//! # Responsibility
//! - Define the order/item records shared by store, service and CLI.
//! - Compute derived totals from items.
//! - Validate caller input before it reaches the store.
//!
//! # Invariants
//! - `id == 0` means "not persisted yet".
//! - `original_amount`/`discounted_amount` are derived: after
//!   `recompute_totals` they equal the item sums, and they are never stored.
//! - Items belong to exactly one order; `Item::order_id` is a back-reference.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned order identifier. `0` is the unsaved sentinel.
pub type OrderId = u64;

/// Order processing state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Unknown,
    Created,
    Processed,
    Canceled,
}

/// Way of payment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    #[default]
    Unknown,
    Card,
    Wallet,
}

impl PaymentType {
    /// Parses the request-level spelling (`card` / `wallet`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "card" => Some(Self::Card),
            "wallet" => Some(Self::Wallet),
            _ => None,
        }
    }
}

/// One line entry of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Owning order; `0` until the order is saved.
    #[serde(default)]
    pub order_id: OrderId,
    /// Caller-defined item identifier.
    pub id: u64,
    pub amount: u64,
    pub discounted_amount: u64,
}

impl Item {
    pub fn new(id: u64, amount: u64, discounted_amount: u64) -> Self {
        Self {
            order_id: 0,
            id,
            amount,
            discounted_amount,
        }
    }
}

/// A purchase record owned by one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: OrderId,
    #[serde(default)]
    pub status: OrderStatus,
    pub user_id: u64,
    pub payment_type: PaymentType,
    /// Derived: sum of `items[].amount`.
    #[serde(default)]
    pub original_amount: u64,
    /// Derived: sum of `items[].discounted_amount`.
    #[serde(default)]
    pub discounted_amount: u64,
    /// RFC3339 UTC creation time assigned by the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Order {
    /// Creates an unsaved order in `Created` state.
    pub fn new(user_id: u64, payment_type: PaymentType, items: Vec<Item>) -> Self {
        Self {
            status: OrderStatus::Created,
            user_id,
            payment_type,
            items,
            ..Self::default()
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Recomputes derived totals from items, starting from zero.
    ///
    /// Idempotent: running it again over the same items gives the same
    /// totals. Sums saturate at `u64::MAX`.
    pub fn recompute_totals(&mut self) {
        let (original, discounted) = self.items.iter().fold((0u64, 0u64), |(orig, disc), item| {
            (
                orig.saturating_add(item.amount),
                disc.saturating_add(item.discounted_amount),
            )
        });
        self.original_amount = original;
        self.discounted_amount = discounted;
    }

    /// Stamps a freshly assigned id onto the order and every item.
    pub(crate) fn assign_id(&mut self, id: OrderId) {
        self.id = id;
        for item in &mut self.items {
            item.order_id = id;
        }
    }

    /// Validates caller input for a new order.
    ///
    /// The store itself does not call this: an order with no items is a
    /// valid write at the persistence layer.
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.user_id == 0 {
            return Err(OrderValidationError::InvalidUserId);
        }
        if self.payment_type == PaymentType::Unknown {
            return Err(OrderValidationError::InvalidPaymentType);
        }
        if self.items.is_empty() {
            return Err(OrderValidationError::EmptyItems);
        }
        for (index, item) in self.items.iter().enumerate() {
            if item.id == 0 {
                return Err(OrderValidationError::InvalidItemId { index });
            }
            if item.amount == 0 {
                return Err(OrderValidationError::InvalidAmount { index });
            }
        }
        Ok(())
    }
}

/// Input validation failures for a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderValidationError {
    InvalidUserId,
    InvalidPaymentType,
    EmptyItems,
    InvalidItemId { index: usize },
    InvalidAmount { index: usize },
}

impl Display for OrderValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUserId => write!(f, "invalid user id"),
            Self::InvalidPaymentType => write!(f, "invalid payment type"),
            Self::EmptyItems => write!(f, "items can't be empty"),
            Self::InvalidItemId { index } => write!(f, "invalid item id at position {index}"),
            Self::InvalidAmount { index } => write!(f, "invalid amount at position {index}"),
        }
    }
}

impl Error for OrderValidationError {}

#[cfg(test)]
mod tests {
    use super::{Item, Order, OrderStatus, OrderValidationError, PaymentType};

    fn sample() -> Order {
        Order::new(
            1,
            PaymentType::Card,
            vec![Item::new(2, 10_000, 100), Item::new(2, 2, 3)],
        )
    }

    #[test]
    fn new_order_is_unsaved_and_created() {
        let order = sample();
        assert_eq!(order.id, 0);
        assert!(!order.is_persisted());
        assert_eq!(order.status, OrderStatus::Created);
        assert!(order.items.iter().all(|item| item.order_id == 0));
    }

    #[test]
    fn recompute_totals_sums_items() {
        let mut order = sample();
        order.recompute_totals();
        assert_eq!(order.original_amount, 10_002);
        assert_eq!(order.discounted_amount, 103);
    }

    #[test]
    fn recompute_totals_is_idempotent() {
        let mut order = sample();
        order.recompute_totals();
        order.recompute_totals();
        assert_eq!(order.original_amount, 10_002);
        assert_eq!(order.discounted_amount, 103);
    }

    // Regression guard: totals must be reset, never accumulated.
    #[test]
    fn recompute_totals_overwrites_stale_values() {
        let mut order = sample();
        order.original_amount = 999;
        order.discounted_amount = 999;
        order.recompute_totals();
        assert_eq!(order.original_amount, 10_002);
        assert_eq!(order.discounted_amount, 103);
    }

    #[test]
    fn recompute_totals_on_empty_items_is_zero() {
        let mut order = Order::new(1, PaymentType::Wallet, Vec::new());
        order.original_amount = 5;
        order.recompute_totals();
        assert_eq!(order.original_amount, 0);
        assert_eq!(order.discounted_amount, 0);
    }

    #[test]
    fn recompute_totals_saturates() {
        let mut order = Order::new(
            1,
            PaymentType::Card,
            vec![Item::new(1, u64::MAX, 0), Item::new(2, 1, 0)],
        );
        order.recompute_totals();
        assert_eq!(order.original_amount, u64::MAX);
    }

    #[test]
    fn assign_id_stamps_items() {
        let mut order = sample();
        order.assign_id(42);
        assert_eq!(order.id, 42);
        assert!(order.items.iter().all(|item| item.order_id == 42));
    }

    #[test]
    fn validate_accepts_well_formed_order() {
        assert_eq!(sample().validate(), Ok(()));
    }

    #[test]
    fn validate_reports_first_violation() {
        let mut order = sample();
        order.user_id = 0;
        assert_eq!(order.validate(), Err(OrderValidationError::InvalidUserId));

        let mut order = sample();
        order.payment_type = PaymentType::Unknown;
        assert_eq!(
            order.validate(),
            Err(OrderValidationError::InvalidPaymentType)
        );

        let mut order = sample();
        order.items.clear();
        assert_eq!(order.validate(), Err(OrderValidationError::EmptyItems));

        let mut order = sample();
        order.items[1].id = 0;
        assert_eq!(
            order.validate(),
            Err(OrderValidationError::InvalidItemId { index: 1 })
        );

        let mut order = sample();
        order.items[0].amount = 0;
        assert_eq!(
            order.validate(),
            Err(OrderValidationError::InvalidAmount { index: 0 })
        );
    }

    #[test]
    fn payment_type_parses_request_spelling() {
        assert_eq!(PaymentType::parse("Card"), Some(PaymentType::Card));
        assert_eq!(PaymentType::parse(" wallet "), Some(PaymentType::Wallet));
        assert_eq!(PaymentType::parse("cash"), None);
    }

    #[test]
    fn order_serializes_with_snake_case_enums() {
        let mut order = sample();
        order.assign_id(7);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["status"], "created");
        assert_eq!(json["payment_type"], "card");
        assert_eq!(json["items"][0]["order_id"], 7);
        assert!(json.get("created_at").is_none());
    }
}
