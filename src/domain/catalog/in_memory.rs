use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::{CatalogError, ProductCatalog};
use crate::domain::order::{LineItem, ProductId};

/// A catalog figure with its current price and stock
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub stock: i64,
}

impl Product {
    pub fn new(id: i64, name: impl Into<String>, price: Decimal, stock: i64) -> Self {
        Self {
            id: ProductId(id),
            name: name.into(),
            price,
            stock,
        }
    }
}

/// Catalog kept in process memory; every operation runs under one lock
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<ProductId, Product>>,
}

impl InMemoryCatalog {
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        Self {
            products: Mutex::new(products.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub async fn stock(&self, id: ProductId) -> Option<i64> {
        self.products.lock().await.get(&id).map(|p| p.stock)
    }
}

/// Requested quantity per product; a product may appear on several lines
fn quantities(lines: &[LineItem]) -> BTreeMap<ProductId, i64> {
    let mut totals = BTreeMap::new();
    for line in lines {
        *totals.entry(line.product_id).or_insert(0) += i64::from(line.quantity);
    }
    totals
}

fn ensure_known(products: &HashMap<ProductId, Product>, lines: &[LineItem]) -> Result<(), CatalogError> {
    match lines.iter().find(|line| !products.contains_key(&line.product_id)) {
        Some(line) => Err(CatalogError::ProductNotFound(line.product_id)),
        None => Ok(()),
    }
}

/// Check prices and stock for `lines`, counting `returned` units as available
fn check_reservation(
    products: &HashMap<ProductId, Product>,
    lines: &[LineItem],
    returned: &BTreeMap<ProductId, i64>,
) -> Result<(), CatalogError> {
    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or(CatalogError::ProductNotFound(line.product_id))?;

        if product.price != line.unit_price {
            return Err(CatalogError::PriceMismatch {
                product_id: line.product_id,
                expected: product.price,
                actual: line.unit_price,
            });
        }
    }

    for (product_id, requested) in quantities(lines) {
        let stock = products.get(&product_id).map_or(0, |p| p.stock);
        let available = stock + returned.get(&product_id).copied().unwrap_or(0);
        if available < requested {
            return Err(CatalogError::InsufficientStock {
                product_id,
                requested,
                available,
            });
        }
    }

    Ok(())
}

fn adjust_stock(products: &mut HashMap<ProductId, Product>, lines: &[LineItem], sign: i64) {
    for (product_id, quantity) in quantities(lines) {
        if let Some(product) = products.get_mut(&product_id) {
            product.stock += sign * quantity;
        }
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn reserve(&self, lines: &[LineItem]) -> Result<(), CatalogError> {
        let mut products = self.products.lock().await;
        check_reservation(&products, lines, &BTreeMap::new())?;
        adjust_stock(&mut products, lines, -1);

        tracing::debug!(line_count = lines.len(), "Reserved stock");
        Ok(())
    }

    async fn release(&self, lines: &[LineItem]) -> Result<(), CatalogError> {
        let mut products = self.products.lock().await;
        ensure_known(&products, lines)?;
        adjust_stock(&mut products, lines, 1);

        tracing::debug!(line_count = lines.len(), "Released stock");
        Ok(())
    }

    async fn exchange(&self, release: &[LineItem], reserve: &[LineItem]) -> Result<(), CatalogError> {
        let mut products = self.products.lock().await;
        ensure_known(&products, release)?;
        check_reservation(&products, reserve, &quantities(release))?;
        adjust_stock(&mut products, release, 1);
        adjust_stock(&mut products, reserve, -1);

        tracing::debug!(
            released = release.len(),
            reserved = reserve.len(),
            "Exchanged stock"
        );
        Ok(())
    }
}
