// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (CustomerSnapshot, LineItem, OrderTotals)
// - The persisted Order document
// - Events (OrderCreated, OrderLinesUpdated, etc.)
// - Commands (CreateOrder, UpdateLines, etc.)
// - Errors (OrderError enum)
// - Aggregate (OrderAggregate with business logic)
// - Command Handler (OrderCommandHandler)
// - Store facade and queries (OrderStore, OrderFilter, Page)
//
// This is completely separate from the generic event sourcing infrastructure.
//
// ============================================================================

pub mod value_objects;
pub mod model;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;
pub mod query;
pub mod store;

#[cfg(test)]
pub mod test_support;

// Re-export for convenience
pub use value_objects::*;
pub use model::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
pub use query::*;
pub use store::*;
