use rust_decimal::Decimal;

use crate::domain::order::ProductId;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("Product {0} not found in catalog")]
    ProductNotFound(ProductId),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    #[error("Price {actual} for product {product_id} does not match catalog price {expected}")]
    PriceMismatch {
        product_id: ProductId,
        expected: Decimal,
        actual: Decimal,
    },
}
