use serde::{Deserialize, Serialize};

use super::model::Order;
use super::value_objects::UserId;

// ============================================================================
// Order Queries - filters and page descriptors
// ============================================================================

/// Zero-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Self {
        Self { page, size }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

/// One page of results plus the numbers needed to navigate the rest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_elements: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        self.total_elements.div_ceil(self.size)
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub include_deleted: bool,
}

impl OrderFilter {
    /// Orders that are not deleted, of any user
    pub fn active() -> Self {
        Self::default()
    }

    /// Every order, deleted ones included
    pub fn all() -> Self {
        Self {
            user_id: None,
            include_deleted: true,
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        (self.include_deleted || !order.is_deleted) && self.user_id.is_none_or(|id| id == order.user_id)
    }
}
