use futures_util::StreamExt;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use funko_orders::domain::order::{NewLineItem, ProductId, UserId};
use funko_orders::{seed, InMemoryCatalog, Metrics, OrderStore, OrderStoreConfig, Product};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,funko_orders=debug")),
        )
        .init();

    tracing::info!("🚀 Starting Funko order store demo");

    // === 1. Configuration and metrics ===
    let config = OrderStoreConfig::from_env()?;
    tracing::info!(
        page_size = config.page_size,
        retry_attempts = config.retry.max_attempts,
        "Loaded configuration"
    );

    let metrics = Arc::new(Metrics::new()?);

    // === 2. Catalog with the figures referenced by the seed ===
    let batman_price = Decimal::new(1999, 2);
    let spiderman_price = Decimal::new(1599, 2);
    let catalog = Arc::new(InMemoryCatalog::with_products([
        Product::new(2, "Batman", batman_price, 25),
        Product::new(3, "Spiderman", spiderman_price, 10),
    ]));

    let store = OrderStore::new(config, metrics.clone()).with_catalog(catalog.clone());

    // === 3. Seed ===
    let seeded = store.import(seed::seed_orders()?).await?;
    tracing::info!("📦 Imported {} seed orders", seeded);

    // === 4. Demonstrate the order lifecycle ===
    let mut user_orders = std::pin::pin!(store.list_active(Some(UserId(1))));
    let seed_order = user_orders
        .next()
        .await
        .ok_or_else(|| anyhow::anyhow!("seed order missing"))?;

    let order = store
        .create(
            seed_order.user_id,
            seed_order.customer.clone(),
            vec![
                NewLineItem::new(2, 1, batman_price),
                NewLineItem::new(3, 2, spiderman_price),
            ],
        )
        .await?;
    tracing::info!(order_id = %order.id, total = %order.total, total_items = order.total_items, "✅ Order created");

    let order = store
        .update_lines(order.id, vec![NewLineItem::new(3, 4, spiderman_price)])
        .await?;
    tracing::info!(order_id = %order.id, total = %order.total, total_items = order.total_items, "✅ Order updated");

    if let Err(error) = store
        .update_lines(order.id, vec![NewLineItem::new(2, 100, batman_price)])
        .await
    {
        tracing::info!(kind = error.kind().as_str(), error = %error, "Oversized update rejected");
    }

    let order = store.soft_delete(order.id).await?;
    tracing::info!(order_id = %order.id, is_deleted = order.is_deleted, "✅ Order deleted");
    tracing::info!(
        batman = ?catalog.stock(ProductId(2)).await,
        spiderman = ?catalog.stock(ProductId(3)).await,
        "Stock after the lifecycle"
    );

    for envelope in store.history(order.id).await? {
        tracing::info!(
            sequence = envelope.sequence_number,
            event_type = %envelope.event_type,
            "History"
        );
    }

    let active: Vec<_> = store.list_active(None).collect().await;
    tracing::info!(active = active.len(), "Active orders after the lifecycle");

    // === 5. Metrics dump ===
    tracing::info!("📊 Metrics:\n{}", metrics.render()?);

    tracing::info!("🎉 Demo complete!");

    Ok(())
}
