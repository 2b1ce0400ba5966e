use bson::oid::ObjectId;

use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::model::{timestamp_now, Order};
use super::value_objects::{price_lines, OrderTotals};
use crate::event_sourcing::Aggregate;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OrderAggregate {
    pub order: Order,
    pub version: i64,
}

impl OrderAggregate {
    pub fn into_order(self) -> Order {
        self.order
    }

    fn ensure_mutable(&self) -> Result<(), OrderError> {
        if self.order.is_deleted {
            return Err(OrderError::Deleted(self.order.id));
        }
        Ok(())
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for OrderAggregate {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(aggregate_id: ObjectId, event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Created(e) => Ok(Self {
                order: Order {
                    id: aggregate_id,
                    user_id: e.user_id,
                    customer: e.customer.clone(),
                    lines: e.lines.clone(),
                    total_items: e.totals.total_items,
                    total: e.totals.total,
                    created_at: e.created_at,
                    updated_at: e.created_at,
                    is_deleted: false,
                },
                version: 0,
            }),
            OrderEvent::Imported(e) => Ok(Self {
                order: Order {
                    id: aggregate_id,
                    ..e.order.clone()
                },
                version: 0,
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Created(_) | OrderEvent::Imported(_) => Err(OrderError::AlreadyExists(self.order.id)),
            OrderEvent::LinesUpdated(e) => {
                self.order.lines = e.lines.clone();
                self.order.total_items = e.totals.total_items;
                self.order.total = e.totals.total;
                self.order.updated_at = e.updated_at;
                Ok(())
            }
            OrderEvent::SoftDeleted(e) => {
                self.order.is_deleted = true;
                self.order.updated_at = e.deleted_at;
                Ok(())
            }
        }
    }

    fn handle_initial_command(command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder { user_id, customer, lines } => {
                customer.validate()?;
                let lines = price_lines(lines)?;
                let totals = OrderTotals::from_lines(&lines)?;

                Ok(vec![OrderEvent::Created(OrderCreated {
                    user_id: *user_id,
                    customer: customer.clone(),
                    lines,
                    totals,
                    created_at: timestamp_now(),
                })])
            }

            OrderCommand::ImportOrder { order } => {
                order.check_invariants()?;

                Ok(vec![OrderEvent::Imported(OrderImported { order: order.clone() })])
            }

            OrderCommand::UpdateLines { .. } | OrderCommand::SoftDelete => Err(OrderError::NotInitialized),
        }
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder { .. } | OrderCommand::ImportOrder { .. } => {
                Err(OrderError::AlreadyExists(self.order.id))
            }

            OrderCommand::UpdateLines { lines } => {
                self.ensure_mutable()?;

                let lines = price_lines(lines).map_err(|e| e.for_order(self.order.id))?;
                let totals = OrderTotals::from_lines(&lines).map_err(|e| e.for_order(self.order.id))?;

                Ok(vec![OrderEvent::LinesUpdated(OrderLinesUpdated {
                    previous_lines: self.order.lines.clone(),
                    lines,
                    totals,
                    updated_at: timestamp_now(),
                })])
            }

            OrderCommand::SoftDelete => {
                if self.order.is_deleted {
                    return Ok(vec![]); // Already in terminal state
                }

                Ok(vec![OrderEvent::SoftDeleted(OrderSoftDeleted {
                    deleted_at: timestamp_now(),
                })])
            }
        }
    }

    fn aggregate_id(&self) -> ObjectId {
        self.order.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
