//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repositories persist and return raw values; derived totals are the
//!   service layer's job.

pub mod memory;
pub mod order_repo;
