// ============================================================================
// Product Catalog - stock and price checks for order lines
// ============================================================================
//
// Orders only hold weak references to catalog figures. The catalog port is
// consulted when lines are written: the product must exist, the line price
// must match the current catalog price, and stock must cover the quantity.
//
// ============================================================================

pub mod errors;
pub mod in_memory;

pub use errors::CatalogError;
pub use in_memory::{InMemoryCatalog, Product};

use async_trait::async_trait;

use crate::domain::order::LineItem;

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Check and take stock for every line, all or nothing
    async fn reserve(&self, lines: &[LineItem]) -> Result<(), CatalogError>;

    /// Give stock back for every line
    async fn release(&self, lines: &[LineItem]) -> Result<(), CatalogError>;

    /// Give back `release` and take `reserve` in one step
    async fn exchange(&self, release: &[LineItem], reserve: &[LineItem]) -> Result<(), CatalogError>;
}
