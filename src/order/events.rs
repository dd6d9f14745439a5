//! Order lifecycle events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::OrderId;

/// Trigger type of the order state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderEventKind {
    OrderSubmitted,
    OrderAccepted,
    OrderRejected,
    OrderWorking,
    OrderPartiallyFilled,
    OrderFilled,
    OrderCancelled,
    OrderExpired,
    OrderInvalid,
    OrderDenied,
}

impl OrderEventKind {
    pub const ALL: [OrderEventKind; 10] = [
        OrderEventKind::OrderSubmitted,
        OrderEventKind::OrderAccepted,
        OrderEventKind::OrderRejected,
        OrderEventKind::OrderWorking,
        OrderEventKind::OrderPartiallyFilled,
        OrderEventKind::OrderFilled,
        OrderEventKind::OrderCancelled,
        OrderEventKind::OrderExpired,
        OrderEventKind::OrderInvalid,
        OrderEventKind::OrderDenied,
    ];
}

/// Execution of part or all of an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub quantity: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Submitted {
        order_id: OrderId,
    },
    Accepted {
        order_id: OrderId,
        venue_order_id: String,
    },
    Rejected {
        order_id: OrderId,
        reason: String,
    },
    /// Resting on the book; repeated when the order is modified.
    Working {
        order_id: OrderId,
        venue_order_id: String,
        price: Option<Decimal>,
    },
    PartiallyFilled {
        order_id: OrderId,
        fill: Fill,
    },
    Filled {
        order_id: OrderId,
        fill: Fill,
    },
    Cancelled {
        order_id: OrderId,
    },
    Expired {
        order_id: OrderId,
    },
    Invalid {
        order_id: OrderId,
        reason: String,
    },
    Denied {
        order_id: OrderId,
        reason: String,
    },
}

impl OrderEvent {
    pub fn kind(&self) -> OrderEventKind {
        match self {
            OrderEvent::Submitted { .. } => OrderEventKind::OrderSubmitted,
            OrderEvent::Accepted { .. } => OrderEventKind::OrderAccepted,
            OrderEvent::Rejected { .. } => OrderEventKind::OrderRejected,
            OrderEvent::Working { .. } => OrderEventKind::OrderWorking,
            OrderEvent::PartiallyFilled { .. } => OrderEventKind::OrderPartiallyFilled,
            OrderEvent::Filled { .. } => OrderEventKind::OrderFilled,
            OrderEvent::Cancelled { .. } => OrderEventKind::OrderCancelled,
            OrderEvent::Expired { .. } => OrderEventKind::OrderExpired,
            OrderEvent::Invalid { .. } => OrderEventKind::OrderInvalid,
            OrderEvent::Denied { .. } => OrderEventKind::OrderDenied,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Submitted { order_id }
            | OrderEvent::Accepted { order_id, .. }
            | OrderEvent::Rejected { order_id, .. }
            | OrderEvent::Working { order_id, .. }
            | OrderEvent::PartiallyFilled { order_id, .. }
            | OrderEvent::Filled { order_id, .. }
            | OrderEvent::Cancelled { order_id }
            | OrderEvent::Expired { order_id }
            | OrderEvent::Invalid { order_id, .. }
            | OrderEvent::Denied { order_id, .. } => *order_id,
        }
    }
}
