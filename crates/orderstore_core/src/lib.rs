//! Order persistence and aggregation core.
//! Owns the transactional order write, the batched order read and the
//! derived-totals step applied on top of it.

pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{load_config, parse_config, ConfigError, StoreConfig};
pub use context::{ContextError, OpContext};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics};
pub use model::order::{Item, Order, OrderId, OrderStatus, OrderValidationError, PaymentType};
pub use repo::memory::InMemoryOrderRepository;
pub use repo::order_repo::{
    OrderRepoError, OrderRepoResult, OrderRepository, OrderSet, SqliteOrderRepository,
};
pub use service::order_service::{OrderService, OrderServiceError};
pub use tokio_util::sync::CancellationToken;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
