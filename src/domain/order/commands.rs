use super::model::Order;
use super::value_objects::{CustomerSnapshot, NewLineItem, UserId};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    CreateOrder {
        user_id: UserId,
        customer: CustomerSnapshot,
        lines: Vec<NewLineItem>,
    },
    ImportOrder {
        order: Order,
    },
    UpdateLines {
        lines: Vec<NewLineItem>,
    },
    SoftDelete,
}

impl OrderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::CreateOrder { .. } => "create",
            OrderCommand::ImportOrder { .. } => "import",
            OrderCommand::UpdateLines { .. } => "update_lines",
            OrderCommand::SoftDelete => "soft_delete",
        }
    }

    /// Whether the command brings a new order into existence
    pub fn is_initial(&self) -> bool {
        matches!(self, OrderCommand::CreateOrder { .. } | OrderCommand::ImportOrder { .. })
    }
}
