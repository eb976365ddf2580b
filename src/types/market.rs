use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::serde_helpers::{decimal, opt_decimal, opt_u64};

/// Whether a bar is still being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarStatus {
    Open,
    Closed,
    #[serde(other)]
    Unknown,
}

/// One bar of a bar-chart stream.
///
/// The open bar is re-sent with updated values on every trade until a bar
/// with `BarStatus::Closed` finalizes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bar {
    pub time_stamp: DateTime<Utc>,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub open: Decimal,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub high: Decimal,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub low: Decimal,
    #[serde(deserialize_with = "decimal::deserialize")]
    pub close: Decimal,
    #[serde(default, deserialize_with = "opt_u64::deserialize")]
    pub total_volume: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64::deserialize")]
    pub up_volume: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64::deserialize")]
    pub down_volume: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64::deserialize")]
    pub total_ticks: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64::deserialize")]
    pub up_ticks: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64::deserialize")]
    pub down_ticks: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64::deserialize")]
    pub open_interest: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64::deserialize")]
    pub epoch: Option<u64>,
    #[serde(default)]
    pub is_realtime: Option<bool>,
    #[serde(default)]
    pub is_end_of_history: Option<bool>,
    #[serde(default)]
    pub bar_status: Option<BarStatus>,
}

impl Bar {
    pub fn is_closed(&self) -> bool {
        self.bar_status == Some(BarStatus::Closed)
    }
}

/// A quote update. Only `Symbol` is always present; other fields are sent
/// when they change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Quote {
    pub symbol: String,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub bid: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub bid_size: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub ask: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub ask_size: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub last: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub last_size: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub open: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub high: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub low: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub close: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub previous_close: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub net_change: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_decimal::deserialize")]
    pub net_change_pct: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_u64::deserialize")]
    pub volume: Option<u64>,
    #[serde(default)]
    pub trade_time: Option<DateTime<Utc>>,
}

impl Quote {
    /// Midpoint of bid and ask, when both are known
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }
}
