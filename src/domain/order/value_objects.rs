use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Decimal places kept for currency amounts
pub const CURRENCY_SCALE: u32 = 2;

/// Largest amount stored: fifteen significant digits survive the float
/// representation of the order document unchanged
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_999, CURRENCY_SCALE)
}

/// Round an amount to currency precision (midpoint away from zero)
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Reference to the purchasing user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a catalog figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Postal address captured with the customer snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "calle")]
    pub street: String,
    #[serde(rename = "numero")]
    pub number: String,
    #[serde(rename = "ciudad")]
    pub city: String,
    #[serde(rename = "provincia")]
    pub province: String,
    #[serde(rename = "pais")]
    pub country: String,
    #[serde(rename = "codigoPostal")]
    pub postal_code: String,
}

/// Customer data frozen at order time.
///
/// Later profile edits never reach orders already placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    #[serde(rename = "nombreCompleto")]
    pub full_name: String,
    pub email: String,
    #[serde(rename = "telefono")]
    pub phone: String,
    #[serde(rename = "direccion")]
    pub address: Address,
}

impl CustomerSnapshot {
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.full_name.trim().is_empty() {
            return Err(OrderError::InvalidCustomer {
                field: "nombreCompleto",
                reason: "cannot be empty".to_string(),
            });
        }
        if !self.email.contains('@') {
            return Err(OrderError::InvalidCustomer {
                field: "email",
                reason: format!("invalid email format: {}", self.email),
            });
        }
        Ok(())
    }
}

/// A requested order line, before pricing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl NewLineItem {
    pub fn new(product_id: i64, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            product_id: ProductId(product_id),
            quantity,
            unit_price,
        }
    }
}

/// One priced line of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(rename = "idFunko")]
    pub product_id: ProductId,
    #[serde(rename = "cantidad")]
    pub quantity: i32,
    #[serde(rename = "precioFunko", with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(rename = "total", with = "rust_decimal::serde::float")]
    pub line_total: Decimal,
}

impl LineItem {
    /// Validate a requested line and compute its total
    pub fn price(request: &NewLineItem) -> Result<Self, OrderError> {
        Self::check_quantity_and_price(request.product_id, request.quantity, request.unit_price)?;

        Ok(Self {
            product_id: request.product_id,
            quantity: request.quantity,
            unit_price: request.unit_price,
            line_total: line_total(request.product_id, request.quantity, request.unit_price)?,
        })
    }

    /// Check a stored line against the pricing rules
    pub fn verify(&self) -> Result<(), OrderError> {
        Self::check_quantity_and_price(self.product_id, self.quantity, self.unit_price)?;

        let expected = line_total(self.product_id, self.quantity, self.unit_price)?;
        if self.line_total != expected {
            return Err(OrderError::LineTotalMismatch {
                product_id: self.product_id,
                expected,
                actual: self.line_total,
            });
        }
        Ok(())
    }

    fn check_quantity_and_price(
        product_id: ProductId,
        quantity: i32,
        unit_price: Decimal,
    ) -> Result<(), OrderError> {
        if quantity < 1 {
            return Err(OrderError::InvalidQuantity { product_id, quantity });
        }
        if unit_price.is_sign_negative() && !unit_price.is_zero() {
            return Err(OrderError::NegativePrice { product_id, unit_price });
        }
        if unit_price.normalize().scale() > CURRENCY_SCALE {
            return Err(OrderError::PriceTooPrecise { product_id, unit_price });
        }
        if unit_price > max_amount() {
            return Err(OrderError::AmountOverflow { product_id });
        }
        Ok(())
    }
}

fn line_total(product_id: ProductId, quantity: i32, unit_price: Decimal) -> Result<Decimal, OrderError> {
    Decimal::from(quantity)
        .checked_mul(unit_price)
        .map(round_currency)
        .filter(|total| *total <= max_amount())
        .ok_or(OrderError::AmountOverflow { product_id })
}

/// Price a full set of requested lines
pub fn price_lines(requests: &[NewLineItem]) -> Result<Vec<LineItem>, OrderError> {
    if requests.is_empty() {
        return Err(OrderError::EmptyLines);
    }
    requests.iter().map(LineItem::price).collect()
}

/// Derived totals of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub total_items: i64,
    pub total: Decimal,
}

impl OrderTotals {
    /// Pure fold over already-rounded line totals
    pub fn from_lines(lines: &[LineItem]) -> Result<Self, OrderError> {
        lines.iter().try_fold(
            Self {
                total_items: 0,
                total: Decimal::ZERO,
            },
            |acc, line| {
                let total = acc
                    .total
                    .checked_add(line.line_total)
                    .filter(|total| *total <= max_amount())
                    .ok_or(OrderError::AmountOverflow { product_id: line.product_id })?;
                Ok(Self {
                    total_items: acc.total_items + i64::from(line.quantity),
                    total,
                })
            },
        )
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
