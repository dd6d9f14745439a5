//! Messages exchanged between the execution engine, venues and observers.

use serde::{Deserialize, Serialize};

use crate::core::OrderId;
use crate::order::{CancelOrder, OrderEvent, OrderEventKind, OrderState, SubmitOrder};

/// A cancel request that could not be honoured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRejected {
    pub order_id: OrderId,
    /// `None` when the order is unknown.
    pub state: Option<OrderState>,
    pub reason: String,
}

/// A venue report the order's lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRejected {
    pub order_id: OrderId,
    pub state: OrderState,
    pub trigger: OrderEventKind,
}

crate::payload_enum! {
    #[derive(Debug, Clone)]
    pub enum TradingMessage => TradingMessageKind {
        SubmitOrder(SubmitOrder),
        CancelOrder(CancelOrder),
        OrderEvent(OrderEvent),
        CancelRejected(CancelRejected),
        TransitionRejected(TransitionRejected),
    }
}
