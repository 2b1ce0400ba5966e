use bson::oid::ObjectId;
use chrono::{NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::value_objects::{CustomerSnapshot, LineItem, OrderTotals, UserId};

// ============================================================================
// Order Document - the persisted representation
// ============================================================================
//
// Field names follow the `pedidos` collection so seed/import documents map
// onto this struct without a translation layer.
//
// ============================================================================

pub type OrderId = ObjectId;

/// Current wall-clock time as stored in order documents (zone-less, UTC)
pub fn timestamp_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: OrderId,
    #[serde(rename = "idUsuario")]
    pub user_id: UserId,
    #[serde(rename = "cliente")]
    pub customer: CustomerSnapshot,
    #[serde(rename = "lineasPedido")]
    pub lines: Vec<LineItem>,
    pub total_items: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub is_deleted: bool,
}

impl Order {
    pub fn totals(&self) -> OrderTotals {
        OrderTotals {
            total_items: self.total_items,
            total: self.total,
        }
    }

    /// Check every consistency rule of a stored order
    ///
    /// Used for documents that did not go through pricing, e.g. imports.
    pub fn check_invariants(&self) -> Result<(), OrderError> {
        self.customer.validate().map_err(|e| e.for_order(self.id))?;

        if self.lines.is_empty() {
            return Err(OrderError::EmptyLines.for_order(self.id));
        }
        for line in &self.lines {
            line.verify().map_err(|e| e.for_order(self.id))?;
        }

        let expected = OrderTotals::from_lines(&self.lines).map_err(|e| e.for_order(self.id))?;
        if self.total_items != expected.total_items {
            return Err(OrderError::TotalsMismatch {
                order_id: self.id,
                field: "totalItems",
                expected: expected.total_items.to_string(),
                actual: self.total_items.to_string(),
            });
        }
        if self.total != expected.total {
            return Err(OrderError::TotalsMismatch {
                order_id: self.id,
                field: "total",
                expected: expected.total.to_string(),
                actual: self.total.to_string(),
            });
        }
        Ok(())
    }

    pub fn to_document(&self) -> bson::ser::Result<bson::Document> {
        bson::to_document(self)
    }

    pub fn from_document(document: bson::Document) -> bson::de::Result<Self> {
        bson::from_document(document)
    }
}
