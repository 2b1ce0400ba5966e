use bson::oid::ObjectId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use super::aggregate::OrderAggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::OrderEvent;
use super::value_objects::LineItem;
use crate::domain::catalog::ProductCatalog;
use crate::event_sourcing::{Aggregate, EventEnvelope, EventStore, EventStoreError};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Catalog → Event Store
//
// Writes to one order are serialized by a per-order lock. The event store
// still checks the expected version, so handlers sharing a store retry
// conflicting writes with backoff instead of overwriting each other.
//
// ============================================================================

/// Stock movement implied by the events of one command
enum StockPlan {
    Untouched,
    Reserve(Vec<LineItem>),
    Exchange {
        release: Vec<LineItem>,
        reserve: Vec<LineItem>,
    },
    Release(Vec<LineItem>),
}

impl StockPlan {
    fn for_events(current: Option<&OrderAggregate>, events: &[OrderEvent]) -> Self {
        match events.first() {
            Some(OrderEvent::Created(e)) => StockPlan::Reserve(e.lines.clone()),
            Some(OrderEvent::LinesUpdated(e)) => StockPlan::Exchange {
                release: e.previous_lines.clone(),
                reserve: e.lines.clone(),
            },
            Some(OrderEvent::SoftDeleted(_)) => current
                .map(|aggregate| StockPlan::Release(aggregate.order.lines.clone()))
                .unwrap_or(StockPlan::Untouched),
            Some(OrderEvent::Imported(_)) | None => StockPlan::Untouched,
        }
    }
}

pub struct OrderCommandHandler {
    event_store: Arc<EventStore<OrderAggregate>>,
    catalog: Option<Arc<dyn ProductCatalog>>,
    locks: Mutex<HashMap<ObjectId, Arc<AsyncMutex<()>>>>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl OrderCommandHandler {
    pub fn new(
        event_store: Arc<EventStore<OrderAggregate>>,
        catalog: Option<Arc<dyn ProductCatalog>>,
        retry: RetryConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            event_store,
            catalog,
            locks: Mutex::new(HashMap::new()),
            retry,
            metrics,
        }
    }

    pub fn event_store(&self) -> &Arc<EventStore<OrderAggregate>> {
        &self.event_store
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Handle a command and persist resulting events
    ///
    /// Returns the order state after the command. A command that produces no
    /// events (deleting a deleted order) returns the stored state unchanged.
    pub async fn handle(
        &self,
        order_id: ObjectId,
        command: OrderCommand,
        correlation_id: Uuid,
    ) -> Result<OrderAggregate, OrderError> {
        let command_name = command.name();
        let started = Instant::now();

        let entry = self.order_lock(order_id);
        let result = {
            let _guard = entry.lock.lock().await;
            let command = &command;

            retry_on_transient(&self.retry, command_name, move |attempt| {
                if attempt > 1 {
                    self.metrics.record_retry_attempt(command_name, attempt);
                }
                self.attempt(order_id, command, correlation_id)
            })
            .await
            .into_result()
        };
        drop(entry);

        self.metrics.record_command(
            command_name,
            started.elapsed().as_secs_f64(),
            result.as_ref().map(|_| ()).map_err(OrderError::kind),
        );

        match &result {
            Ok(aggregate) => tracing::debug!(
                order_id = %order_id,
                command = command_name,
                version = aggregate.version,
                correlation_id = %correlation_id,
                "Command handled"
            ),
            Err(error) => tracing::warn!(
                order_id = %order_id,
                command = command_name,
                kind = error.kind().as_str(),
                error = %error,
                correlation_id = %correlation_id,
                "Command rejected"
            ),
        }

        result
    }

    /// One load → decide → reserve → append round
    async fn attempt(
        &self,
        order_id: ObjectId,
        command: &OrderCommand,
        correlation_id: Uuid,
    ) -> Result<OrderAggregate, OrderError> {
        let current = match self.event_store.load_aggregate(order_id).await {
            Ok(aggregate) => Some(aggregate),
            Err(EventStoreError::NotFound(_)) => None,
            Err(error) => return Err(error.into()),
        };
        let expected_version = current.as_ref().map_or(0, |aggregate| aggregate.version());

        let events = match &current {
            Some(aggregate) => aggregate.handle_command(command)?,
            None if command.is_initial() => {
                OrderAggregate::handle_initial_command(command).map_err(|e| e.for_order(order_id))?
            }
            None => return Err(OrderError::NotFound(order_id)),
        };

        if events.is_empty() {
            tracing::debug!(order_id = %order_id, command = command.name(), "Command was a no-op");
            return current.ok_or(OrderError::NotFound(order_id));
        }
        let mut next = evolve(order_id, current.clone(), &events)?;

        let plan = StockPlan::for_events(current.as_ref(), &events);
        self.take_stock(&plan).await?;

        let user_id = next.order.user_id;
        let envelopes: Vec<_> = (expected_version + 1..)
            .zip(events)
            .map(|(sequence_number, event)| {
                EventEnvelope::new(order_id, sequence_number, event, correlation_id)
                    .with_user(user_id.0)
                    .with_metadata("command", command.name())
            })
            .collect();

        match self
            .event_store
            .append_events(order_id, expected_version, next.clone(), envelopes)
            .await
        {
            Ok(new_version) => next.set_version(new_version),
            Err(error) => {
                self.undo_stock(order_id, &plan).await;
                return Err(error.into());
            }
        }

        if let StockPlan::Release(lines) = &plan {
            self.release_stock(order_id, lines).await;
        }

        tracing::info!(
            order_id = %order_id,
            user_id = %user_id,
            command = command.name(),
            version = next.version,
            line_count = next.order.lines.len(),
            "Order updated"
        );

        Ok(next)
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    async fn take_stock(&self, plan: &StockPlan) -> Result<(), OrderError> {
        let Some(catalog) = &self.catalog else {
            return Ok(());
        };

        let (operation, result) = match plan {
            StockPlan::Reserve(lines) => ("reserve", catalog.reserve(lines).await),
            StockPlan::Exchange { release, reserve } => ("exchange", catalog.exchange(release, reserve).await),
            StockPlan::Release(_) | StockPlan::Untouched => return Ok(()),
        };

        self.metrics.record_stock_operation(operation, result.is_ok());
        result.map_err(OrderError::from)
    }

    async fn release_stock(&self, order_id: ObjectId, lines: &[LineItem]) {
        let Some(catalog) = &self.catalog else {
            return;
        };

        let result = catalog.release(lines).await;
        self.metrics.record_stock_operation("release", result.is_ok());
        if let Err(error) = result {
            tracing::error!(
                order_id = %order_id,
                error = %error,
                "Order deleted but its stock could not be returned"
            );
        }
    }

    /// Give back whatever `take_stock` took when the append did not go through
    async fn undo_stock(&self, order_id: ObjectId, plan: &StockPlan) {
        let Some(catalog) = &self.catalog else {
            return;
        };

        let result = match plan {
            StockPlan::Reserve(lines) => catalog.release(lines).await,
            StockPlan::Exchange { release, reserve } => catalog.exchange(reserve, release).await,
            StockPlan::Release(_) | StockPlan::Untouched => return,
        };

        self.metrics.record_stock_operation("compensate", result.is_ok());
        match result {
            Ok(()) => tracing::debug!(order_id = %order_id, "Compensated stock after failed append"),
            Err(error) => tracing::error!(
                order_id = %order_id,
                error = %error,
                "Failed to compensate stock after failed append"
            ),
        }
    }

    // ========================================================================
    // Per-order locks
    // ========================================================================

    fn order_lock(&self, order_id: ObjectId) -> LockEntry<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(order_id).or_default().clone();
        LockEntry {
            locks: &self.locks,
            order_id,
            lock,
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Per-order lock handle; the map entry goes away with its last handle,
/// also when the command future is dropped mid-flight
struct LockEntry<'a> {
    locks: &'a Mutex<HashMap<ObjectId, Arc<AsyncMutex<()>>>>,
    order_id: ObjectId,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in this handle
        let last = locks
            .get(&self.order_id)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2);
        if last {
            locks.remove(&self.order_id);
        }
    }
}

/// Fold non-empty `events` into the current state, or into a new aggregate
fn evolve(
    order_id: ObjectId,
    current: Option<OrderAggregate>,
    events: &[OrderEvent],
) -> Result<OrderAggregate, OrderError> {
    let mut events = events.iter();

    let mut aggregate = match current {
        Some(aggregate) => aggregate,
        None => {
            let first = events.next().ok_or(OrderError::NotInitialized)?;
            OrderAggregate::apply_first_event(order_id, first)?
        }
    };

    for event in events {
        aggregate.apply_event(event)?;
    }

    Ok(aggregate)
}

// ============================================================================
// Unit Tests
// ============================================================================
