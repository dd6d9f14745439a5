//! Order commands.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{Error, OrderId, OrderType, Result, Side, Symbol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

impl SubmitOrder {
    pub fn market(symbol: Symbol, side: Side, quantity: Decimal) -> Self {
        Self {
            order_id: OrderId::new(),
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
        }
    }

    pub fn limit(symbol: Symbol, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            order_id: OrderId::new(),
            symbol,
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Shape checks that hold regardless of limits: limit orders carry a
    /// positive price, market orders carry none.
    pub fn validate(&self) -> Result<()> {
        match (self.order_type, self.price) {
            (OrderType::Limit, None) => Err(Error::validation("limit order without a price")),
            (OrderType::Limit, Some(price)) if price <= Decimal::ZERO => Err(Error::validation(
                format!("limit price {} must be positive", price),
            )),
            (OrderType::Market, Some(price)) => Err(Error::validation(format!(
                "market order must not carry a price, got {}",
                price
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
}
