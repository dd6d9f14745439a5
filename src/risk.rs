//! Risk Gate - hard limits checked before an order reaches a venue.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core::config::RiskConfig;
use crate::order::SubmitOrder;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("order quantity {0} must be positive")]
    NonPositiveQuantity(Decimal),

    #[error("order quantity {0} exceeds max {1}")]
    QuantityTooLarge(Decimal, Decimal),

    #[error("order notional {0} exceeds max {1}")]
    NotionalTooLarge(Decimal, Decimal),

    #[error("order notional {0} x {1} is out of range")]
    NotionalOverflow(Decimal, Decimal),

    #[error("trading paused: {0}")]
    TradingPaused(String),
}

/// Risk Gate - enforces trading limits before order submission.
pub struct RiskGate {
    config: RiskConfig,
    /// Price used to value market orders.
    reference_price: Option<Decimal>,
    paused: bool,
    pause_reason: Option<String>,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            reference_price: None,
            paused: false,
            pause_reason: None,
        }
    }

    pub fn with_reference_price(mut self, price: Decimal) -> Self {
        self.reference_price = Some(price);
        self
    }

    /// Check if an order passes risk controls.
    pub fn check_order(&self, order: &SubmitOrder) -> Result<(), RiskError> {
        if self.paused {
            return Err(RiskError::TradingPaused(
                self.pause_reason.clone().unwrap_or_else(|| "unknown".into()),
            ));
        }

        if order.quantity <= Decimal::ZERO {
            return Err(RiskError::NonPositiveQuantity(order.quantity));
        }
        if order.quantity > self.config.max_order_quantity {
            return Err(RiskError::QuantityTooLarge(
                order.quantity,
                self.config.max_order_quantity,
            ));
        }

        // Market orders without a reference price cannot be valued
        if let Some(price) = order.price.or(self.reference_price) {
            let notional = order
                .quantity
                .checked_mul(price)
                .ok_or(RiskError::NotionalOverflow(order.quantity, price))?;
            if notional > self.config.max_order_notional {
                return Err(RiskError::NotionalTooLarge(
                    notional,
                    self.config.max_order_notional,
                ));
            }
        }

        Ok(())
    }

    /// Pause all trading.
    pub fn pause(&mut self, reason: impl Into<String>) {
        self.paused = true;
        self.pause_reason = Some(reason.into());
    }

    /// Resume trading.
    pub fn resume(&mut self) {
        self.paused = false;
        self.pause_reason = None;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}
