use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::serde_helpers::{decimal, opt_decimal};

/// Order status codes as reported by the brokerage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Received
    Ack,
    /// Broken
    Bro,
    /// Canceled
    Can,
    /// Expired
    Exp,
    /// Filled
    Fll,
    /// Partial fill, still working
    Flp,
    /// Partial fill, no longer working
    Fpr,
    /// Too late to cancel
    Lat,
    /// Sent
    Opn,
    /// Out (canceled by the exchange)
    Out,
    /// Rejected
    Rej,
    /// Replace pending
    Uch,
    /// Cancel pending
    Ucn,
    /// Trade server canceled
    Tsc,
    /// Cancel request rejected
    Rjc,
    /// Queued
    Don,
    /// Reinstated
    Rsn,
    /// Condition met
    Cnd,
    /// OSO order
    Oso,
    /// Suspended
    Sus,
    #[serde(other)]
    Other,
}

impl OrderStatus {
    /// No further updates are expected for an order in this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Fll
                | OrderStatus::Fpr
                | OrderStatus::Can
                | OrderStatus::Exp
                | OrderStatus::Rej
                | OrderStatus::Out
                | OrderStatus::Bro
                | OrderStatus::Tsc
        )
    }
}

/// One leg of an order update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderLeg {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub buy_or_sell: Option<String>,
    #[serde(default)]
    pub open_or_close: Option<String>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub quantity_ordered: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub exec_quantity: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub quantity_remaining: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub execution_price: Option<Decimal>,
}

/// An order snapshot from the order stream.
///
/// Each update carries the full current state of the order, not a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OrderUpdate {
    #[serde(rename = "AccountID")]
    pub account_id: String,
    #[serde(rename = "OrderID")]
    pub order_id: String,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub status_description: Option<String>,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub limit_price: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub stop_price: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub filled_price: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub commission_fee: Option<Decimal>,
    #[serde(default)]
    pub opened_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reject_reason: Option<String>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub legs: Vec<OrderLeg>,
}

impl OrderUpdate {
    pub fn is_terminal(&self) -> bool {
        self.status.map(|s| s.is_terminal()).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LongShort {
    Long,
    Short,
}

/// A position snapshot from the position stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Position {
    #[serde(rename = "AccountID")]
    pub account_id: String,
    #[serde(rename = "PositionID")]
    pub position_id: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub long_short: Option<LongShort>,
    #[serde(default = "Decimal::default", deserialize_with = "decimal::deserialize")]
    pub quantity: Decimal,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub average_price: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub last: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub bid: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub ask: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub market_value: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub total_cost: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub todays_profit_loss: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub unrealized_profit_loss: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub unrealized_profit_loss_percent: Option<Decimal>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// The position has been closed since the last update
    #[serde(default)]
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_order_update() {
        let order: OrderUpdate = serde_json::from_str(
            r#"{"AccountID":"SIM123","OrderID":"924243071","Status":"FLL",
                "StatusDescription":"Filled","OrderType":"Limit","LimitPrice":"150.25",
                "FilledPrice":"150.20","OpenedDateTime":"2024-03-01T14:31:02Z",
                "Legs":[{"Symbol":"AAPL","BuyOrSell":"Buy","QuantityOrdered":"10",
                         "ExecQuantity":"10","ExecutionPrice":"150.20"}]}"#,
        )
        .unwrap();

        assert_eq!(order.account_id, "SIM123");
        assert_eq!(order.status, Some(OrderStatus::Fll));
        assert!(order.is_terminal());
        assert_eq!(order.limit_price, Some(Decimal::from_str("150.25").unwrap()));
        assert_eq!(order.legs.len(), 1);
        assert_eq!(order.legs[0].exec_quantity, Some(Decimal::from(10)));
    }

    #[test]
    fn test_unknown_status_is_not_terminal() {
        let order: OrderUpdate =
            serde_json::from_str(r#"{"AccountID":"A","OrderID":"1","Status":"XYZ"}"#).unwrap();
        assert_eq!(order.status, Some(OrderStatus::Other));
        assert!(!order.is_terminal());
        assert!(!OrderStatus::Opn.is_terminal());
        assert!(OrderStatus::Can.is_terminal());
    }

    #[test]
    fn test_order_requires_ids() {
        assert!(serde_json::from_str::<OrderUpdate>(r#"{"Status":"OPN"}"#).is_err());
    }

    #[test]
    fn test_deleted_position() {
        let position: Position = serde_json::from_str(
            r#"{"AccountID":"SIM123","PositionID":"64630792","Symbol":"MSFT",
                "LongShort":"Long","Quantity":"10","AveragePrice":"216.68",
                "UnrealizedProfitLoss":"-3.50","Deleted":true}"#,
        )
        .unwrap();

        assert_eq!(position.long_short, Some(LongShort::Long));
        assert_eq!(position.quantity, Decimal::from(10));
        assert_eq!(
            position.unrealized_profit_loss,
            Some(Decimal::from_str("-3.50").unwrap())
        );
        assert!(position.deleted);
    }
}
