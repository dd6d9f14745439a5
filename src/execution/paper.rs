//! Paper venue - in-process simulated broker.
//!
//! Every submitted order is accepted at once and filled in full after the
//! configured latency, at its limit price or the reference price for market
//! orders. Cancels that beat the fill win.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::messages::{CancelRejected, TradingMessage};
use crate::core::config::PaperConfig;
use crate::core::{OrderId, Result};
use crate::messaging::{Endpoint, Envelope, Mailbox};
use crate::order::{CancelOrder, Fill, OrderEvent, SubmitOrder};
use crate::scheduler::Scheduler;

pub struct PaperVenue {
    reports: Option<Endpoint<Envelope<TradingMessage>>>,
    scheduler: Arc<dyn Scheduler>,
    fill_latency: Duration,
    reference_price: Decimal,
    sequence: u64,
    /// Accepted and not yet filled or cancelled.
    resting: Arc<Mutex<HashSet<OrderId>>>,
}

impl PaperVenue {
    pub fn new(config: &PaperConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            reports: None,
            scheduler,
            fill_latency: config.fill_latency(),
            reference_price: config.reference_price,
            sequence: 0,
            resting: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Where execution reports go.
    pub fn connect(&mut self, reports: Endpoint<Envelope<TradingMessage>>) {
        self.reports = Some(reports);
    }

    /// Orders accepted so far.
    pub fn accepted(&self) -> u64 {
        self.sequence
    }

    pub fn resting(&self) -> usize {
        self.resting.lock().len()
    }

    pub fn mailbox(self) -> Result<Mailbox<PaperVenue, TradingMessage>> {
        let mut mailbox = Mailbox::new("paper-venue", self);
        mailbox.register_handler::<SubmitOrder, _>(|venue, envelope| venue.on_submit(envelope))?;
        mailbox.register_handler::<CancelOrder, _>(|venue, envelope| venue.on_cancel(envelope))?;
        Ok(mailbox)
    }

    fn report(&self, envelope: Envelope<TradingMessage>) {
        match &self.reports {
            Some(reports) => reports.send(envelope),
            None => warn!("paper venue not connected, report dropped"),
        }
    }

    fn on_submit(&mut self, envelope: Envelope<SubmitOrder>) -> anyhow::Result<()> {
        let request_id = envelope.id();
        let order = envelope.into_payload();

        self.sequence += 1;
        let venue_order_id = format!("PAPER-{}", self.sequence);
        self.resting.lock().insert(order.order_id);
        info!(
            order_id = %order.order_id,
            venue_order_id = %venue_order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.quantity,
            "paper order accepted"
        );
        self.report(Envelope::response(
            OrderEvent::Accepted {
                order_id: order.order_id,
                venue_order_id,
            },
            request_id,
        ));

        let fill = Fill {
            quantity: order.quantity,
            price: order.price.unwrap_or(self.reference_price),
        };
        let order_id = order.order_id;
        let resting = self.resting.clone();
        let reports = self.reports.clone();
        self.scheduler
            .schedule_once(
                self.fill_latency,
                Box::new(move || {
                    if !resting.lock().remove(&order_id) {
                        return;
                    }
                    debug!(order_id = %order_id, price = %fill.price, "paper fill");
                    if let Some(reports) = reports {
                        reports.send(Envelope::event(OrderEvent::Filled { order_id, fill }));
                    }
                }),
            )
            .detach();
        Ok(())
    }

    fn on_cancel(&mut self, envelope: Envelope<CancelOrder>) -> anyhow::Result<()> {
        let request_id = envelope.id();
        let order_id = envelope.payload().order_id;

        if self.resting.lock().remove(&order_id) {
            info!(order_id = %order_id, "paper order cancelled");
            self.report(Envelope::response(OrderEvent::Cancelled { order_id }, request_id));
        } else {
            self.report(Envelope::response(
                CancelRejected {
                    order_id,
                    state: None,
                    reason: "order is not resting at the venue".into(),
                },
                request_id,
            ));
        }
        Ok(())
    }
}
