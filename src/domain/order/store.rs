use bson::oid::ObjectId;
use futures_util::stream::{self, Stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::aggregate::OrderAggregate;
use super::command_handler::OrderCommandHandler;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::OrderEvent;
use super::model::{Order, OrderId};
use super::query::{OrderFilter, Page, PageRequest};
use super::value_objects::{CustomerSnapshot, NewLineItem, UserId};
use crate::config::OrderStoreConfig;
use crate::domain::catalog::ProductCatalog;
use crate::event_sourcing::{EventEnvelope, EventStore};
use crate::metrics::Metrics;

// ============================================================================
// Order Store - public facade over the order aggregate
// ============================================================================
//
// Writes go through the command handler; reads clone snapshots straight
// from the event store under its read lock.
//
// ============================================================================

pub struct OrderStore {
    handler: OrderCommandHandler,
    config: OrderStoreConfig,
}

impl OrderStore {
    pub fn new(config: OrderStoreConfig, metrics: Arc<Metrics>) -> Self {
        Self::from_parts(Arc::new(EventStore::new("Order")), None, config, metrics)
    }

    /// Build a store over an existing event store, e.g. to share it
    pub fn from_parts(
        event_store: Arc<EventStore<OrderAggregate>>,
        catalog: Option<Arc<dyn ProductCatalog>>,
        config: OrderStoreConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let handler = OrderCommandHandler::new(event_store, catalog, config.retry.clone(), metrics);
        Self { handler, config }
    }

    /// Check prices and stock against `catalog` on every write
    pub fn with_catalog(self, catalog: Arc<dyn ProductCatalog>) -> Self {
        let event_store = self.handler.event_store().clone();
        let metrics = self.handler.metrics().clone();
        Self::from_parts(event_store, Some(catalog), self.config, metrics)
    }

    pub fn event_store(&self) -> &Arc<EventStore<OrderAggregate>> {
        self.handler.event_store()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.handler.metrics()
    }

    pub fn config(&self) -> &OrderStoreConfig {
        &self.config
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn create(
        &self,
        user_id: UserId,
        customer: CustomerSnapshot,
        lines: Vec<NewLineItem>,
    ) -> Result<Order, OrderError> {
        let order_id = ObjectId::new();
        let command = OrderCommand::CreateOrder {
            user_id,
            customer,
            lines,
        };

        let aggregate = self.handler.handle(order_id, command, Uuid::new_v4()).await?;
        Ok(aggregate.into_order())
    }

    pub async fn update_lines(&self, order_id: OrderId, lines: Vec<NewLineItem>) -> Result<Order, OrderError> {
        let command = OrderCommand::UpdateLines { lines };
        let aggregate = self.handler.handle(order_id, command, Uuid::new_v4()).await?;
        Ok(aggregate.into_order())
    }

    /// Flag the order as deleted; deleting it again returns the same state
    pub async fn soft_delete(&self, order_id: OrderId) -> Result<Order, OrderError> {
        let aggregate = self
            .handler
            .handle(order_id, OrderCommand::SoftDelete, Uuid::new_v4())
            .await?;
        Ok(aggregate.into_order())
    }

    /// Store already-persisted documents as they are
    ///
    /// Every document is checked before the first one is written; a single
    /// inconsistent document or duplicate id rejects the whole batch.
    pub async fn import(&self, orders: Vec<Order>) -> Result<usize, OrderError> {
        let mut seen = HashSet::with_capacity(orders.len());
        for order in &orders {
            order.check_invariants()?;
            if !seen.insert(order.id) || self.event_store().aggregate_exists(order.id).await {
                return Err(OrderError::AlreadyExists(order.id));
            }
        }

        let correlation_id = Uuid::new_v4();
        let count = orders.len();
        for order in orders {
            let order_id = order.id;
            self.handler
                .handle(order_id, OrderCommand::ImportOrder { order }, correlation_id)
                .await?;
        }

        self.metrics().record_import(count);
        tracing::info!(count = count, correlation_id = %correlation_id, "Imported orders");

        Ok(count)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current state of an order, deleted orders included
    pub async fn get(&self, order_id: OrderId) -> Result<Order, OrderError> {
        let aggregate = self.event_store().load_aggregate(order_id).await?;
        Ok(aggregate.into_order())
    }

    /// Lazily stream orders that are not deleted, oldest first
    ///
    /// Orders are fetched `page_size` at a time as the stream is polled.
    /// Calling this again starts a fresh scan over the current state.
    pub fn list_active(&self, user_id: Option<UserId>) -> impl Stream<Item = Order> + Send + '_ {
        let filter = OrderFilter {
            user_id,
            include_deleted: false,
        };
        let page_size = self.config.page_size.max(1);
        let event_store = self.event_store();

        stream::unfold(Some(0usize), move |cursor| async move {
            let cursor = cursor?;
            let batch = event_store
                .scan_from(cursor, page_size, |aggregate| filter.matches(&aggregate.order))
                .await;

            tracing::debug!(
                cursor = cursor,
                fetched = batch.items.len(),
                exhausted = batch.next_cursor.is_none(),
                "Fetched active orders"
            );

            let orders: Vec<Order> = batch.items.into_iter().map(OrderAggregate::into_order).collect();
            Some((stream::iter(orders), batch.next_cursor))
        })
        .flatten()
    }

    pub async fn find_page(&self, filter: OrderFilter, request: PageRequest) -> Page<Order> {
        let (items, total_elements) = self
            .event_store()
            .query(|aggregate| filter.matches(&aggregate.order), request.offset(), request.size)
            .await;

        Page {
            content: items.into_iter().map(OrderAggregate::into_order).collect(),
            page: request.page,
            size: request.size,
            total_elements,
        }
    }

    /// Events recorded for an order, oldest first
    pub async fn history(&self, order_id: OrderId) -> Result<Vec<EventEnvelope<OrderEvent>>, OrderError> {
        Ok(self.event_store().load_events(order_id).await?)
    }

    /// Rebuild an order from its history, ignoring the stored snapshot
    pub async fn replay(&self, order_id: OrderId) -> anyhow::Result<Order> {
        let aggregate = self.event_store().replay(order_id).await?;
        Ok(aggregate.into_order())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{CatalogError, InMemoryCatalog, Product};
    use crate::domain::order::test_support::{money, sample_customer, seed_lines, seed_order};
    use crate::domain::order::{ErrorKind, ProductId};
    use crate::utils::RetryConfig;
    use std::time::Duration;

    fn store() -> OrderStore {
        OrderStore::new(OrderStoreConfig::default(), Arc::new(Metrics::new().unwrap()))
    }

    fn small_pages(page_size: usize) -> OrderStore {
        let config = OrderStoreConfig {
            page_size,
            ..OrderStoreConfig::default()
        };
        OrderStore::new(config, Arc::new(Metrics::new().unwrap()))
    }

    fn catalog() -> Arc<InMemoryCatalog> {
        Arc::new(InMemoryCatalog::with_products([
            Product::new(2, "Batman", money("19.99"), 5),
            Product::new(3, "Spiderman", money("15.99"), 4),
        ]))
    }

    async fn create_for(store: &OrderStore, user: i64) -> Order {
        store
            .create(UserId(user), sample_customer(), seed_lines())
            .await
            .unwrap()
    }

    async fn collect(store: &OrderStore, user_id: Option<UserId>) -> Vec<ObjectId> {
        store.list_active(user_id).map(|order| order.id).collect().await
    }

    // ========================================================================
    // Create / Get
    // ========================================================================

    #[tokio::test]
    async fn test_create_computes_seed_totals() {
        let store = store();
        let order = create_for(&store, 1).await;

        assert_eq!(order.total_items, 3);
        assert_eq!(order.total, money("51.97"));
        assert_eq!(order.lines[1].line_total, money("31.98"));
        assert_eq!(order.created_at, order.updated_at);
        assert!(!order.is_deleted);
        assert_eq!(store.get(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_create_totals_match_lines() {
        let store = store();
        let lines = vec![
            NewLineItem::new(1, 4, money("0.35")),
            NewLineItem::new(2, 7, money("12.50")),
            NewLineItem::new(5, 1, money("0")),
        ];
        let order = store.create(UserId(2), sample_customer(), lines).await.unwrap();

        let quantity: i64 = order.lines.iter().map(|l| i64::from(l.quantity)).sum();
        let total: rust_decimal::Decimal = order.lines.iter().map(|l| l.line_total).sum();
        assert_eq!(order.total_items, quantity);
        assert_eq!(order.total, total);
        assert_eq!(order.total, money("88.90"));
    }

    #[tokio::test]
    async fn test_create_with_empty_lines_is_validation_error() {
        let store = store();
        let error = store.create(UserId(1), sample_customer(), vec![]).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(store.event_store().is_empty().await);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_quantity_and_price() {
        let store = store();

        let zero = store
            .create(UserId(1), sample_customer(), vec![NewLineItem::new(2, 0, money("19.99"))])
            .await
            .unwrap_err();
        assert_eq!(zero.kind(), ErrorKind::Validation);
        assert!(zero.to_string().contains("Invalid quantity 0"));

        let negative = store
            .create(UserId(1), sample_customer(), vec![NewLineItem::new(2, 1, money("-1.00"))])
            .await
            .unwrap_err();
        assert_eq!(negative.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let store = store();
        let error = store.get(ObjectId::new()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    // ========================================================================
    // Update / Delete
    // ========================================================================

    #[tokio::test]
    async fn test_update_lines_recomputes_totals() {
        let store = store();
        let order = create_for(&store, 1).await;

        let updated = store
            .update_lines(order.id, vec![NewLineItem::new(3, 3, money("15.99"))])
            .await
            .unwrap();

        assert_eq!(updated.total_items, 3);
        assert_eq!(updated.total, money("47.97"));
        assert_eq!(updated.created_at, order.created_at);
        assert!(updated.updated_at >= order.updated_at);
        updated.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_update_malformed_lines_keeps_order() {
        let store = store();
        let order = create_for(&store, 1).await;

        let error = store.update_lines(order.id, vec![]).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(store.get(order.id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let store = store();
        let error = store.update_lines(ObjectId::new(), seed_lines()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_soft_delete_is_idempotent() {
        let store = store();
        let order = create_for(&store, 1).await;

        let first = store.soft_delete(order.id).await.unwrap();
        let second = store.soft_delete(order.id).await.unwrap();

        assert!(first.is_deleted);
        assert_eq!(first, second);
        assert_eq!(store.history(order.id).await.unwrap().len(), 2);

        // Deleted orders stay readable
        assert!(store.get(order.id).await.unwrap().is_deleted);
    }

    #[tokio::test]
    async fn test_update_after_delete_is_conflict() {
        let store = store();
        let order = create_for(&store, 1).await;
        store.soft_delete(order.id).await.unwrap();

        let error = store.update_lines(order.id, seed_lines()).await.unwrap_err();
        assert!(matches!(error, OrderError::Deleted(id) if id == order.id));
        assert_eq!(error.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let store = store();
        let error = store.soft_delete(ObjectId::new()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    // ========================================================================
    // Listing / Paging
    // ========================================================================

    #[tokio::test]
    async fn test_list_active_skips_deleted_and_filters_user() {
        let store = small_pages(2);
        let a = create_for(&store, 1).await;
        let b = create_for(&store, 2).await;
        let c = create_for(&store, 1).await;
        let d = create_for(&store, 1).await;
        store.soft_delete(c.id).await.unwrap();

        assert_eq!(collect(&store, None).await, vec![a.id, b.id, d.id]);
        assert_eq!(collect(&store, Some(UserId(1))).await, vec![a.id, d.id]);
        assert!(collect(&store, Some(UserId(9))).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_active_is_restartable() {
        let store = small_pages(1);
        let a = create_for(&store, 1).await;

        assert_eq!(collect(&store, None).await, vec![a.id]);

        let b = create_for(&store, 1).await;
        store.soft_delete(a.id).await.unwrap();

        assert_eq!(collect(&store, None).await, vec![b.id]);
    }

    #[tokio::test]
    async fn test_list_active_is_lazy() {
        let store = small_pages(1);
        let a = create_for(&store, 1).await;
        let b = create_for(&store, 1).await;

        let mut orders = Box::pin(store.list_active(None));
        assert_eq!(orders.next().await.map(|o| o.id), Some(a.id));

        // Created after the first batch was fetched, still reached by the cursor
        let c = create_for(&store, 1).await;
        assert_eq!(orders.next().await.map(|o| o.id), Some(b.id));
        assert_eq!(orders.next().await.map(|o| o.id), Some(c.id));
        assert!(orders.next().await.is_none());
    }

    #[tokio::test]
    async fn test_find_page_metadata() {
        let store = store();
        let mut ids = Vec::new();
        for user in [1, 1, 2, 1, 1] {
            ids.push(create_for(&store, user).await.id);
        }
        store.soft_delete(ids[0]).await.unwrap();

        let page = store
            .find_page(OrderFilter::active().for_user(UserId(1)), PageRequest::new(0, 2))
            .await;
        assert_eq!(page.total_elements, 3);
        assert_eq!(page.total_pages(), 2);
        assert!(page.has_next());
        assert_eq!(page.content.iter().map(|o| o.id).collect::<Vec<_>>(), vec![ids[1], ids[3]]);

        let all = store.find_page(OrderFilter::all(), PageRequest::new(2, 2)).await;
        assert_eq!(all.total_elements, 5);
        assert_eq!(all.content.len(), 1);
        assert!(!all.has_next());
    }

    // ========================================================================
    // History / Replay
    // ========================================================================

    #[tokio::test]
    async fn test_replay_reproduces_snapshot() {
        let store = store();
        let order = create_for(&store, 1).await;
        store
            .update_lines(order.id, vec![NewLineItem::new(2, 2, money("19.99"))])
            .await
            .unwrap();
        store.soft_delete(order.id).await.unwrap();

        let history = store.history(order.id).await.unwrap();
        let types: Vec<_> = history.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["OrderCreated", "OrderLinesUpdated", "OrderSoftDeleted"]);

        assert_eq!(store.replay(order.id).await.unwrap(), store.get(order.id).await.unwrap());
    }

    // ========================================================================
    // Import
    // ========================================================================

    #[tokio::test]
    async fn test_import_keeps_documents_as_given() {
        let store = store();
        let seed = seed_order();

        assert_eq!(store.import(vec![seed.clone()]).await.unwrap(), 1);
        assert_eq!(store.get(seed.id).await.unwrap(), seed);
        assert_eq!(store.metrics().orders_imported.get(), 1);
    }

    #[tokio::test]
    async fn test_import_is_all_or_nothing() {
        let store = store();
        let good = seed_order();
        let mut bad = seed_order();
        bad.id = ObjectId::new();
        bad.total = money("10.00");

        let error = store.import(vec![good.clone(), bad]).await.unwrap_err();
        assert!(matches!(error, OrderError::TotalsMismatch { field: "total", .. }));
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(store.event_store().is_empty().await);
    }

    #[tokio::test]
    async fn test_import_rejects_unrounded_line_totals() {
        let store = store();
        let mut order = seed_order();
        order.lines[0].line_total = money("19.994");
        order.lines[1].line_total = money("31.976");

        let error = store.import(vec![order]).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(store.event_store().is_empty().await);
    }

    #[tokio::test]
    async fn test_created_orders_round_trip_through_documents() {
        let store = store();

        let precise = store
            .create(UserId(1), sample_customer(), vec![NewLineItem::new(2, 1, money("0.1234567890123456789"))])
            .await
            .unwrap_err();
        assert_eq!(precise.kind(), ErrorKind::Validation);

        let huge = store
            .create(UserId(1), sample_customer(), vec![NewLineItem::new(2, 1, money("123456789012345678.99"))])
            .await
            .unwrap_err();
        assert_eq!(huge.kind(), ErrorKind::Validation);

        let order = store
            .create(UserId(1), sample_customer(), vec![NewLineItem::new(2, 3, money("3333333333333.33"))])
            .await
            .unwrap();
        let json: Order = serde_json::from_str(&serde_json::to_string(&order).unwrap()).unwrap();
        assert_eq!(json, order);
        assert_eq!(Order::from_document(order.to_document().unwrap()).unwrap(), order);
    }

    #[tokio::test]
    async fn test_import_rejects_duplicate_ids() {
        let store = store();
        let seed = seed_order();

        let in_batch = store.import(vec![seed.clone(), seed.clone()]).await.unwrap_err();
        assert_eq!(in_batch.kind(), ErrorKind::Conflict);

        store.import(vec![seed.clone()]).await.unwrap();
        let existing = store.import(vec![seed.clone()]).await.unwrap_err();
        assert!(matches!(existing, OrderError::AlreadyExists(id) if id == seed.id));
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    #[tokio::test]
    async fn test_catalog_stock_follows_lifecycle() {
        let catalog = catalog();
        let store = store().with_catalog(catalog.clone());

        let order = create_for(&store, 1).await;
        assert_eq!(catalog.stock(ProductId(2)).await, Some(4));
        assert_eq!(catalog.stock(ProductId(3)).await, Some(2));

        store
            .update_lines(order.id, vec![NewLineItem::new(3, 4, money("15.99"))])
            .await
            .unwrap();
        assert_eq!(catalog.stock(ProductId(2)).await, Some(5));
        assert_eq!(catalog.stock(ProductId(3)).await, Some(0));

        store.soft_delete(order.id).await.unwrap();
        store.soft_delete(order.id).await.unwrap();
        assert_eq!(catalog.stock(ProductId(3)).await, Some(4));
    }

    #[tokio::test]
    async fn test_catalog_rejections_are_validation_errors() {
        let catalog = catalog();
        let store = store().with_catalog(catalog.clone());

        let price = store
            .create(UserId(1), sample_customer(), vec![NewLineItem::new(2, 1, money("9.99"))])
            .await
            .unwrap_err();
        assert!(matches!(price, OrderError::Catalog(CatalogError::PriceMismatch { .. })));
        assert_eq!(price.kind(), ErrorKind::Validation);

        let unknown = store
            .create(UserId(1), sample_customer(), vec![NewLineItem::new(77, 1, money("1.00"))])
            .await
            .unwrap_err();
        assert!(matches!(unknown, OrderError::Catalog(CatalogError::ProductNotFound(ProductId(77)))));

        let order = create_for(&store, 1).await;
        let too_many = store
            .update_lines(order.id, vec![NewLineItem::new(2, 6, money("19.99"))])
            .await
            .unwrap_err();
        assert!(matches!(too_many, OrderError::Catalog(CatalogError::InsufficientStock { .. })));
        assert_eq!(store.get(order.id).await.unwrap(), order);
        assert_eq!(catalog.stock(ProductId(2)).await, Some(4));
    }

    // ========================================================================
    // Concurrency
    // ========================================================================

    #[tokio::test]
    async fn test_concurrent_updates_on_one_store_are_serialized() {
        let store = Arc::new(store());
        let order = create_for(&store, 1).await;

        let mut tasks = Vec::new();
        for quantity in 1..=8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update_lines(order.id, vec![NewLineItem::new(2, quantity, money("19.99"))])
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.history(order.id).await.unwrap().len(), 9);
        store.get(order.id).await.unwrap().check_invariants().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stores_sharing_events_retry_conflicts() {
        let config = OrderStoreConfig {
            page_size: 10,
            retry: RetryConfig {
                max_attempts: 50,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
            },
        };
        let metrics = Arc::new(Metrics::new().unwrap());
        let first = Arc::new(OrderStore::new(config.clone(), metrics.clone()));
        let second = Arc::new(OrderStore::from_parts(
            first.event_store().clone(),
            None,
            config,
            metrics.clone(),
        ));
        let order = create_for(&first, 1).await;

        let mut tasks = Vec::new();
        for round in 0..10 {
            let store = if round % 2 == 0 { first.clone() } else { second.clone() };
            tasks.push(tokio::spawn(async move {
                store
                    .update_lines(order.id, vec![NewLineItem::new(3, round + 1, money("15.99"))])
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // No update was lost: every one of them left an event behind
        assert_eq!(first.history(order.id).await.unwrap().len(), 11);
        second.get(order.id).await.unwrap().check_invariants().unwrap();
        assert_eq!(metrics.commands_total.with_label_values(&["update_lines"]).get(), 10);
    }
}
