//! Order lifecycle states and the shared transition table.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::events::OrderEventKind;
use crate::fsm::{StateTransition, TransitionTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Initialized,
    Submitted,
    Accepted,
    Rejected,
    Working,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
    Invalid,
    Denied,
}

impl OrderState {
    pub const ALL: [OrderState; 11] = [
        OrderState::Initialized,
        OrderState::Submitted,
        OrderState::Accepted,
        OrderState::Rejected,
        OrderState::Working,
        OrderState::PartiallyFilled,
        OrderState::Filled,
        OrderState::Cancelled,
        OrderState::Expired,
        OrderState::Invalid,
        OrderState::Denied,
    ];

    /// No further fills or cancels can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Rejected
                | OrderState::Filled
                | OrderState::Cancelled
                | OrderState::Expired
                | OrderState::Invalid
                | OrderState::Denied
        )
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderState::Initialized => "INITIALIZED",
            OrderState::Submitted => "SUBMITTED",
            OrderState::Accepted => "ACCEPTED",
            OrderState::Rejected => "REJECTED",
            OrderState::Working => "WORKING",
            OrderState::PartiallyFilled => "PARTIALLY_FILLED",
            OrderState::Filled => "FILLED",
            OrderState::Cancelled => "CANCELLED",
            OrderState::Expired => "EXPIRED",
            OrderState::Invalid => "INVALID",
            OrderState::Denied => "DENIED",
        };
        f.write_str(s)
    }
}

/// Every legal order transition. Built once, shared by all orders.
pub static ORDER_TRANSITIONS: Lazy<Arc<TransitionTable<OrderState, OrderEventKind>>> =
    Lazy::new(|| {
        use OrderEventKind as E;
        use OrderState as S;

        let edges = [
            (S::Initialized, E::OrderCancelled, S::Cancelled),
            (S::Initialized, E::OrderInvalid, S::Invalid),
            (S::Initialized, E::OrderDenied, S::Denied),
            (S::Initialized, E::OrderSubmitted, S::Submitted),
            (S::Submitted, E::OrderCancelled, S::Cancelled),
            (S::Submitted, E::OrderRejected, S::Rejected),
            (S::Submitted, E::OrderAccepted, S::Accepted),
            (S::Submitted, E::OrderWorking, S::Working),
            (S::Rejected, E::OrderRejected, S::Rejected),
            (S::Accepted, E::OrderCancelled, S::Cancelled),
            (S::Accepted, E::OrderWorking, S::Working),
            (S::Accepted, E::OrderPartiallyFilled, S::PartiallyFilled),
            (S::Accepted, E::OrderFilled, S::Filled),
            (S::Working, E::OrderCancelled, S::Cancelled),
            // modified while working
            (S::Working, E::OrderWorking, S::Working),
            (S::Working, E::OrderExpired, S::Expired),
            (S::Working, E::OrderPartiallyFilled, S::PartiallyFilled),
            (S::Working, E::OrderFilled, S::Filled),
            (S::PartiallyFilled, E::OrderCancelled, S::Cancelled),
            (S::PartiallyFilled, E::OrderPartiallyFilled, S::PartiallyFilled),
            (S::PartiallyFilled, E::OrderFilled, S::Filled),
        ];

        let table: HashMap<_, _> = edges
            .into_iter()
            .map(|(state, trigger, next)| (StateTransition::new(state, trigger), next))
            .collect();
        Arc::new(table)
    });
