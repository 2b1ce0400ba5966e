use crate::domain::order::Order;

// ============================================================================
// Seed Fixture
// ============================================================================
//
// `database/pedidos.json` holds the documents of the `pedidos` collection in
// extended JSON (`_id` as `{"$oid": ...}`). They are loaded through the
// import path so every invariant is checked before they are stored.
//
// ============================================================================

pub const SEED_ORDERS: &str = include_str!("../database/pedidos.json");

/// Parse a JSON array of order documents
pub fn parse_orders(json: &str) -> serde_json::Result<Vec<Order>> {
    serde_json::from_str(json)
}

pub fn seed_orders() -> serde_json::Result<Vec<Order>> {
    parse_orders(SEED_ORDERS)
}
