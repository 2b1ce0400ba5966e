// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - order: the order aggregate, its commands, events and store facade
// - catalog: product catalog port used to check prices and stock
//
// This layer is separate from the event sourcing infrastructure.
//
// ============================================================================

pub mod order;
pub mod catalog;
