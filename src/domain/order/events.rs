use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::model::Order;
use super::value_objects::{CustomerSnapshot, LineItem, OrderTotals, UserId};
use crate::event_sourcing::DomainEvent;

// ============================================================================
// Order Events - Domain Events for Order Aggregate
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Created(OrderCreated),
    Imported(OrderImported),
    LinesUpdated(OrderLinesUpdated),
    SoftDeleted(OrderSoftDeleted),
}

impl DomainEvent for OrderEvent {
    fn name(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "OrderCreated",
            OrderEvent::Imported(_) => "OrderImported",
            OrderEvent::LinesUpdated(_) => "OrderLinesUpdated",
            OrderEvent::SoftDeleted(_) => "OrderSoftDeleted",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Order Created - lines already priced and totals computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub user_id: UserId,
    pub customer: CustomerSnapshot,
    pub lines: Vec<LineItem>,
    pub totals: OrderTotals,
    pub created_at: NaiveDateTime,
}

/// Order Imported - an existing document accepted as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderImported {
    pub order: Order,
}

/// Order Lines Updated - lines replaced, totals recomputed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLinesUpdated {
    pub previous_lines: Vec<LineItem>,
    pub lines: Vec<LineItem>,
    pub totals: OrderTotals,
    pub updated_at: NaiveDateTime,
}

/// Order Soft Deleted - flag flipped, history retained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSoftDeleted {
    pub deleted_at: NaiveDateTime,
}
