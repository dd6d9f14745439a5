//! Execution layer - Order management
//!
//! The [`ExecutionEngine`] owns every order it has seen and runs inside its
//! own mailbox. Commands arrive from strategies, reports from the venue; each
//! one drives the order's state machine, and everything that happens to an
//! order is re-published as an event.

pub mod messages;
pub mod paper;

pub use messages::{CancelRejected, TradingMessage, TradingMessageKind, TransitionRejected};
pub use paper::PaperVenue;

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::core::{OrderId, Result};
use crate::messaging::{Endpoint, Envelope, Mailbox};
use crate::order::{CancelOrder, Order, OrderError, OrderEvent, OrderEventKind, SubmitOrder};
use crate::risk::RiskGate;

pub type TradingEndpoint = Endpoint<Envelope<TradingMessage>>;

/// Order manager - handles order lifecycle
pub struct ExecutionEngine {
    orders: HashMap<OrderId, Order>,
    risk: RiskGate,
    venue: TradingEndpoint,
    events: TradingEndpoint,
}

impl ExecutionEngine {
    /// Approved commands go to `venue`; order events are published on
    /// `events`.
    pub fn new(risk: RiskGate, venue: TradingEndpoint, events: TradingEndpoint) -> Self {
        Self {
            orders: HashMap::new(),
            risk,
            venue,
            events,
        }
    }

    /// Wrap the engine in a mailbox with its handlers registered.
    pub fn mailbox(self) -> Result<Mailbox<ExecutionEngine, TradingMessage>> {
        let mut mailbox = Mailbox::new("execution-engine", self);
        mailbox.register_handler::<SubmitOrder, _>(|engine, envelope| engine.on_submit(envelope))?;
        mailbox.register_handler::<CancelOrder, _>(|engine, envelope| engine.on_cancel(envelope))?;
        mailbox.register_handler::<OrderEvent, _>(|engine, envelope| engine.on_report(envelope))?;
        mailbox.register_handler::<CancelRejected, _>(|engine, envelope| {
            engine.events.send(envelope.widen());
            Ok(())
        })?;
        mailbox.register_handler::<TransitionRejected, _>(|engine, envelope| {
            engine.events.send(envelope.widen());
            Ok(())
        })?;
        Ok(mailbox)
    }

    /// Get order by ID
    pub fn order(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// Get all orders
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|order| order.is_open())
    }

    pub fn risk_mut(&mut self) -> &mut RiskGate {
        &mut self.risk
    }

    fn publish(&self, event: OrderEvent) {
        self.events.send(Envelope::event(event));
    }

    fn on_submit(&mut self, envelope: Envelope<SubmitOrder>) -> anyhow::Result<()> {
        let command = envelope.payload().clone();
        if self.orders.contains_key(&command.order_id) {
            warn!(order_id = %command.order_id, "duplicate order id, submission ignored");
            return Ok(());
        }

        let mut order = Order::new(&command)?;
        let event = if let Err(e) = command.validate() {
            warn!(order_id = %command.order_id, reason = %e, "order invalid");
            OrderEvent::Invalid {
                order_id: command.order_id,
                reason: e.to_string(),
            }
        } else if let Err(e) = self.risk.check_order(&command) {
            warn!(order_id = %command.order_id, reason = %e, "order denied");
            OrderEvent::Denied {
                order_id: command.order_id,
                reason: e.to_string(),
            }
        } else {
            OrderEvent::Submitted {
                order_id: command.order_id,
            }
        };
        let approved = matches!(event, OrderEvent::Submitted { .. });
        order.apply(event.clone())?;
        self.orders.insert(command.order_id, order);
        self.publish(event);

        if approved {
            info!(
                order_id = %command.order_id,
                symbol = %command.symbol,
                side = %command.side,
                order_type = %command.order_type,
                quantity = %command.quantity,
                price = ?command.price,
                "order submitted"
            );
            self.venue.send(envelope.widen());
        }
        Ok(())
    }

    fn on_cancel(&mut self, envelope: Envelope<CancelOrder>) -> anyhow::Result<()> {
        let order_id = envelope.payload().order_id;
        let rejection = match self.orders.get(&order_id) {
            None => Some(CancelRejected {
                order_id,
                state: None,
                reason: "unknown order".into(),
            }),
            Some(order) if !order.can_apply(OrderEventKind::OrderCancelled) => {
                Some(CancelRejected {
                    order_id,
                    state: Some(order.state()),
                    reason: format!("order cannot be cancelled while {}", order.state()),
                })
            }
            Some(_) => None,
        };

        match rejection {
            Some(rejection) => {
                warn!(order_id = %order_id, reason = %rejection.reason, "cancel rejected");
                self.events.send(Envelope::event(rejection));
            }
            None => {
                debug!(order_id = %order_id, "cancel forwarded to venue");
                self.venue.send(envelope.widen());
            }
        }
        Ok(())
    }

    fn on_report(&mut self, envelope: Envelope<OrderEvent>) -> anyhow::Result<()> {
        let event = envelope.into_payload();
        let order_id = event.order_id();
        let Some(order) = self.orders.get_mut(&order_id) else {
            warn!(
                order_id = %order_id,
                trigger = ?event.kind(),
                "report for unknown order ignored"
            );
            return Ok(());
        };

        let before = order.state();
        match order.apply(event.clone()) {
            Ok(state) => {
                debug!(order_id = %order_id, state = %state, "order updated");
                if state.is_terminal() {
                    info!(
                        order_id = %order_id,
                        state = %state,
                        filled = %order.filled_quantity,
                        avg_price = ?order.avg_fill_price,
                        "order closed"
                    );
                }
                self.publish(event);
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "venue report rejected");
                let rejected = match e {
                    OrderError::Transition(e) => TransitionRejected {
                        order_id,
                        state: e.state,
                        trigger: e.trigger,
                    },
                    OrderError::FillOverflow { .. } => TransitionRejected {
                        order_id,
                        state: before,
                        trigger: event.kind(),
                    },
                };
                self.events.send(Envelope::event(rejected));
            }
        }
        Ok(())
    }
}
