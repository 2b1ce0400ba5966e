pub mod config;
pub mod domain;
pub mod event_sourcing;
pub mod metrics;
pub mod seed;
pub mod utils;

pub use config::OrderStoreConfig;
pub use domain::catalog::{InMemoryCatalog, Product, ProductCatalog};
pub use domain::order::{Order, OrderError, OrderStore};
pub use metrics::Metrics;
