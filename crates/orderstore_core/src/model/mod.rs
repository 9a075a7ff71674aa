//! Domain model for persisted orders.
//!
//! # Responsibility
//! - Define canonical data structures used by store and service logic.
//!
//! # Invariants
//! - Derived totals are computed from items and never treated as stored
//!   source of truth.

pub mod order;
