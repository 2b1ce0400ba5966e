use bson::oid::ObjectId;
use rust_decimal::Decimal;

use super::value_objects::ProductId;
use crate::domain::catalog::CatalogError;
use crate::event_sourcing::EventStoreError;
use crate::utils::IsTransient;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

/// Coarse category callers map to their own responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order lines cannot be empty")]
    EmptyLines,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    #[error("Negative unit price {unit_price} for product {product_id}")]
    NegativePrice { product_id: ProductId, unit_price: Decimal },

    #[error("Unit price {unit_price} for product {product_id} has more than two decimal places")]
    PriceTooPrecise { product_id: ProductId, unit_price: Decimal },

    #[error("Amount overflow while pricing product {product_id}")]
    AmountOverflow { product_id: ProductId },

    #[error("Line total for product {product_id} is {actual}, expected {expected}")]
    LineTotalMismatch {
        product_id: ProductId,
        expected: Decimal,
        actual: Decimal,
    },

    #[error("Order {order_id} has {field} = {actual}, but its lines add up to {expected}")]
    TotalsMismatch {
        order_id: ObjectId,
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Invalid customer {field}: {reason}")]
    InvalidCustomer { field: &'static str, reason: String },

    #[error("Order {order_id}: {source}")]
    InvalidOrder {
        order_id: ObjectId,
        #[source]
        source: Box<OrderError>,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Order not found: {0}")]
    NotFound(ObjectId),

    #[error("Order {0} is deleted and cannot be modified")]
    Deleted(ObjectId),

    #[error("Order {0} already exists")]
    AlreadyExists(ObjectId),

    #[error("Concurrent update on order {order_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        order_id: ObjectId,
        expected: i64,
        actual: i64,
    },

    #[error("Order {order_id} could not be stored: {reason}")]
    Storage { order_id: ObjectId, reason: String },

    /// A command or event that needs an existing order reached one that
    /// has not been created yet
    #[error("Aggregate not initialized")]
    NotInitialized,
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyLines
            | OrderError::InvalidQuantity { .. }
            | OrderError::NegativePrice { .. }
            | OrderError::PriceTooPrecise { .. }
            | OrderError::AmountOverflow { .. }
            | OrderError::LineTotalMismatch { .. }
            | OrderError::TotalsMismatch { .. }
            | OrderError::InvalidCustomer { .. }
            | OrderError::Catalog(_) => ErrorKind::Validation,
            OrderError::InvalidOrder { source, .. } => source.kind(),
            OrderError::NotFound(_) | OrderError::NotInitialized => ErrorKind::NotFound,
            OrderError::Deleted(_)
            | OrderError::AlreadyExists(_)
            | OrderError::ConcurrencyConflict { .. }
            | OrderError::Storage { .. } => ErrorKind::Conflict,
        }
    }

    /// Attach the order id to a validation error raised below the aggregate
    pub fn for_order(self, order_id: ObjectId) -> Self {
        match self {
            OrderError::InvalidOrder { .. } | OrderError::TotalsMismatch { .. } => self,
            other => OrderError::InvalidOrder {
                order_id,
                source: Box::new(other),
            },
        }
    }
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        matches!(self, OrderError::ConcurrencyConflict { .. })
    }
}

impl From<EventStoreError> for OrderError {
    fn from(error: EventStoreError) -> Self {
        match error {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => OrderError::ConcurrencyConflict {
                order_id: aggregate_id,
                expected,
                actual,
            },
            EventStoreError::NotFound(id) => OrderError::NotFound(id),
            EventStoreError::EmptyEvents(id) => OrderError::Storage {
                order_id: id,
                reason: "no events to append".to_string(),
            },
            EventStoreError::SequenceGap {
                aggregate_id,
                expected,
                actual,
            } => OrderError::Storage {
                order_id: aggregate_id,
                reason: format!("event sequence gap, expected {expected} got {actual}"),
            },
        }
    }
}
