//! Order aggregate - lifecycle governed by a finite state machine

pub mod commands;
pub mod events;
pub mod state;

pub use commands::{CancelOrder, SubmitOrder};
pub use events::{Fill, OrderEvent, OrderEventKind};
pub use state::{ORDER_TRANSITIONS, OrderState};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::core::{OrderId, OrderType, Result, Side, Symbol};
use crate::fsm::{FiniteStateMachine, InvalidTransition};

pub type OrderTransitionError = InvalidTransition<OrderState, OrderEventKind>;

/// Why an event could not be applied. The order is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error(transparent)]
    Transition(#[from] OrderTransitionError),

    #[error("fill of {quantity} @ {price} overflows order accounting")]
    FillOverflow { quantity: Decimal, price: Decimal },
}

/// Order
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub venue_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    fsm: FiniteStateMachine<OrderState, OrderEventKind>,
    events: Vec<OrderEvent>,
}

impl Order {
    pub fn new(command: &SubmitOrder) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            id: command.order_id,
            symbol: command.symbol.clone(),
            side: command.side,
            order_type: command.order_type,
            quantity: command.quantity,
            price: command.price,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            venue_order_id: None,
            created_at: now,
            updated_at: now,
            fsm: FiniteStateMachine::new(ORDER_TRANSITIONS.clone(), OrderState::Initialized)?,
            events: Vec::new(),
        })
    }

    pub fn state(&self) -> OrderState {
        self.fsm.current_state()
    }

    pub fn is_open(&self) -> bool {
        !self.state().is_terminal()
    }

    pub fn can_apply(&self, kind: OrderEventKind) -> bool {
        self.fsm.can_process(kind)
    }

    pub fn leaves_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// Events applied so far, oldest first.
    pub fn events(&self) -> &[OrderEvent] {
        &self.events
    }

    /// Drive the lifecycle with `event`. An illegal event leaves the order
    /// exactly as it was.
    pub fn apply(&mut self, event: OrderEvent) -> std::result::Result<OrderState, OrderError> {
        debug_assert_eq!(event.order_id(), self.id);
        let trigger = event.kind();
        if !self.fsm.can_process(trigger) {
            return Err(InvalidTransition {
                state: self.state(),
                trigger,
            }
            .into());
        }

        let totals = match &event {
            OrderEvent::PartiallyFilled { fill, .. } | OrderEvent::Filled { fill, .. } => {
                Some(self.fill_totals(fill).ok_or(OrderError::FillOverflow {
                    quantity: fill.quantity,
                    price: fill.price,
                })?)
            }
            _ => None,
        };
        let next = self.fsm.process(trigger)?;

        match &event {
            OrderEvent::Accepted { venue_order_id, .. } => {
                self.venue_order_id = Some(venue_order_id.clone());
            }
            OrderEvent::Working {
                venue_order_id,
                price,
                ..
            } => {
                self.venue_order_id = Some(venue_order_id.clone());
                if price.is_some() {
                    self.price = *price;
                }
            }
            _ => {}
        }
        if let Some((filled, avg)) = totals {
            self.filled_quantity = filled;
            self.avg_fill_price = avg;
        }

        self.updated_at = Utc::now();
        self.events.push(event);
        Ok(next)
    }

    /// Filled quantity and average price after `fill`, or `None` on overflow.
    fn fill_totals(&self, fill: &Fill) -> Option<(Decimal, Option<Decimal>)> {
        let previous = self
            .avg_fill_price
            .unwrap_or(Decimal::ZERO)
            .checked_mul(self.filled_quantity)?;
        let filled = self.filled_quantity.checked_add(fill.quantity)?;
        let notional = previous.checked_add(fill.quantity.checked_mul(fill.price)?)?;
        if filled > Decimal::ZERO {
            Some((filled, Some(notional.checked_div(filled)?)))
        } else {
            Some((filled, self.avg_fill_price))
        }
    }
}
