use bson::oid::ObjectId;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::event_sourcing::core::{Aggregate, DomainEvent, EventEnvelope};

// ============================================================================
// Generic Event Store - Repository for Aggregates and their Events
// ============================================================================
//
// This is a GENERIC in-memory event store that works with ANY aggregate.
//
// Responsibilities:
// 1. Keep the append-only event history of every aggregate
// 2. Keep the latest snapshot next to the history, written in the same step
// 3. Ensure optimistic concurrency control on every append
// 4. Serve snapshot reads and cursor/page scans without blocking each other
//
// Aggregates are never physically removed; the insertion order of their ids
// is therefore a stable cursor for scans.
//
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EventStoreError {
    #[error("Concurrency conflict on {aggregate_id}: expected version {expected}, but current is {actual}")]
    ConcurrencyConflict {
        aggregate_id: ObjectId,
        expected: i64,
        actual: i64,
    },

    #[error("Aggregate not found: {0}")]
    NotFound(ObjectId),

    #[error("Cannot append empty event list to {0}")]
    EmptyEvents(ObjectId),

    #[error("Event sequence for {aggregate_id} must continue at {expected}, got {actual}")]
    SequenceGap {
        aggregate_id: ObjectId,
        expected: i64,
        actual: i64,
    },
}

struct EventStream<A: Aggregate> {
    snapshot: A,
    events: Vec<EventEnvelope<A::Event>>,
}

impl<A: Aggregate> EventStream<A> {
    fn version(&self) -> i64 {
        self.events.last().map_or(0, |e| e.sequence_number)
    }
}

struct StoreState<A: Aggregate> {
    streams: HashMap<ObjectId, EventStream<A>>,
    insertion_order: Vec<ObjectId>,
}

/// One slice of a cursor scan
#[derive(Debug, Clone)]
pub struct ScanBatch<A> {
    pub items: Vec<A>,
    /// Cursor to continue from, `None` once the scan reached the end
    pub next_cursor: Option<usize>,
}

pub struct EventStore<A: Aggregate> {
    aggregate_type_name: String,
    state: RwLock<StoreState<A>>,
}

impl<A> EventStore<A>
where
    A: Aggregate + Clone,
    A::Event: DomainEvent,
{
    pub fn new(aggregate_type_name: &str) -> Self {
        Self {
            aggregate_type_name: aggregate_type_name.to_string(),
            state: RwLock::new(StoreState {
                streams: HashMap::new(),
                insertion_order: Vec::new(),
            }),
        }
    }

    /// Append events and replace the snapshot in one step
    ///
    /// `expected_version` is the version the caller loaded (0 for a new
    /// aggregate). Returns the new version number after appending.
    pub async fn append_events(
        &self,
        aggregate_id: ObjectId,
        expected_version: i64,
        mut snapshot: A,
        events: Vec<EventEnvelope<A::Event>>,
    ) -> Result<i64, EventStoreError> {
        if events.is_empty() {
            return Err(EventStoreError::EmptyEvents(aggregate_id));
        }

        for (offset, envelope) in (1..).zip(&events) {
            let expected = expected_version + offset;
            if envelope.sequence_number != expected {
                return Err(EventStoreError::SequenceGap {
                    aggregate_id,
                    expected,
                    actual: envelope.sequence_number,
                });
            }
        }

        let mut state = self.state.write().await;

        let current_version = state.streams.get(&aggregate_id).map_or(0, EventStream::version);
        if current_version != expected_version {
            tracing::warn!(
                aggregate_id = %aggregate_id,
                aggregate_type = %self.aggregate_type_name,
                expected = expected_version,
                actual = current_version,
                "Optimistic concurrency check failed"
            );
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: current_version,
            });
        }

        let event_count = events.len();
        let new_version = expected_version + event_count as i64;
        snapshot.set_version(new_version);

        match state.streams.get_mut(&aggregate_id) {
            Some(stream) => {
                stream.events.extend(events);
                stream.snapshot = snapshot;
            }
            None => {
                state.streams.insert(aggregate_id, EventStream { snapshot, events });
                state.insertion_order.push(aggregate_id);
            }
        }

        tracing::info!(
            aggregate_id = %aggregate_id,
            aggregate_type = %self.aggregate_type_name,
            new_version = new_version,
            event_count = event_count,
            "Appended events to event store"
        );

        Ok(new_version)
    }

    /// Latest snapshot of an aggregate
    pub async fn load_aggregate(&self, aggregate_id: ObjectId) -> Result<A, EventStoreError> {
        let state = self.state.read().await;
        state
            .streams
            .get(&aggregate_id)
            .map(|stream| stream.snapshot.clone())
            .ok_or(EventStoreError::NotFound(aggregate_id))
    }

    /// All events for an aggregate, in sequence order
    pub async fn load_events(
        &self,
        aggregate_id: ObjectId,
    ) -> Result<Vec<EventEnvelope<A::Event>>, EventStoreError> {
        let state = self.state.read().await;
        let stream = state
            .streams
            .get(&aggregate_id)
            .ok_or(EventStoreError::NotFound(aggregate_id))?;

        tracing::debug!(
            aggregate_id = %aggregate_id,
            event_count = stream.events.len(),
            "Loaded events"
        );

        Ok(stream.events.clone())
    }

    /// Current version of an aggregate, 0 if it does not exist
    pub async fn get_current_version(&self, aggregate_id: ObjectId) -> i64 {
        let state = self.state.read().await;
        state.streams.get(&aggregate_id).map_or(0, EventStream::version)
    }

    pub async fn aggregate_exists(&self, aggregate_id: ObjectId) -> bool {
        self.get_current_version(aggregate_id).await > 0
    }

    /// Rebuild an aggregate from its history instead of the stored snapshot
    pub async fn replay(&self, aggregate_id: ObjectId) -> anyhow::Result<A>
    where
        A::Error: std::fmt::Display,
    {
        let events = self.load_events(aggregate_id).await?;
        A::load_from_events(&events)
    }

    /// Number of aggregates ever stored
    pub async fn len(&self) -> usize {
        self.state.read().await.insertion_order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Offset/limit query over snapshots in insertion order
    ///
    /// Returns the matching slice and the total number of matches.
    pub async fn query<F>(&self, predicate: F, skip: usize, limit: usize) -> (Vec<A>, usize)
    where
        F: Fn(&A) -> bool,
    {
        let state = self.state.read().await;
        let mut total = 0;
        let mut items = Vec::new();

        for snapshot in Self::snapshots_in_order(&state) {
            if !predicate(snapshot) {
                continue;
            }
            if total >= skip && items.len() < limit {
                items.push(snapshot.clone());
            }
            total += 1;
        }

        (items, total)
    }

    /// Cursor scan over snapshots in insertion order
    ///
    /// Collects up to `limit` matches starting at `cursor`. Items appended
    /// after the scan started are picked up by later batches.
    pub async fn scan_from<F>(&self, cursor: usize, limit: usize, predicate: F) -> ScanBatch<A>
    where
        F: Fn(&A) -> bool,
    {
        let state = self.state.read().await;
        let mut items = Vec::new();
        let mut position = cursor;

        while position < state.insertion_order.len() && items.len() < limit {
            if let Some(stream) = state
                .insertion_order
                .get(position)
                .and_then(|id| state.streams.get(id))
            {
                if predicate(&stream.snapshot) {
                    items.push(stream.snapshot.clone());
                }
            }
            position += 1;
        }

        let next_cursor = (position < state.insertion_order.len()).then_some(position);
        ScanBatch { items, next_cursor }
    }

    fn snapshots_in_order(state: &StoreState<A>) -> impl Iterator<Item = &A> {
        state
            .insertion_order
            .iter()
            .filter_map(|id| state.streams.get(id))
            .map(|stream| &stream.snapshot)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
