//! Shared fixtures for order tests

use bson::oid::ObjectId;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::model::Order;
use super::value_objects::{price_lines, Address, CustomerSnapshot, NewLineItem, OrderTotals, UserId};

pub fn money(amount: &str) -> Decimal {
    Decimal::from_str(amount).unwrap()
}

pub fn sample_customer() -> CustomerSnapshot {
    CustomerSnapshot {
        full_name: "eva gomez".to_string(),
        email: "evagomez@gmail.com".to_string(),
        phone: "+34123456789".to_string(),
        address: Address {
            street: "Calle Mayor".to_string(),
            number: "10".to_string(),
            city: "Madrid".to_string(),
            province: "Madrid".to_string(),
            country: "España".to_string(),
            postal_code: "28001".to_string(),
        },
    }
}

/// The two lines of the seed order: 1 x 19.99 and 2 x 15.99
pub fn seed_lines() -> Vec<NewLineItem> {
    vec![
        NewLineItem::new(2, 1, money("19.99")),
        NewLineItem::new(3, 2, money("15.99")),
    ]
}

pub fn seed_order() -> Order {
    let lines = price_lines(&seed_lines()).unwrap();
    let totals = OrderTotals::from_lines(&lines).unwrap();
    let timestamp = NaiveDateTime::from_str("2023-11-15T12:57:17.3411925").unwrap();

    Order {
        id: ObjectId::parse_str("6536518de9b0d305f193b5ef").unwrap(),
        user_id: UserId(1),
        customer: sample_customer(),
        lines,
        total_items: totals.total_items,
        total: totals.total,
        created_at: timestamp,
        updated_at: timestamp,
        is_deleted: false,
    }
}
