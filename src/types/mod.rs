//! Payloads carried by the streaming endpoints.

mod brokerage;
mod market;
mod serde_helpers;

pub use brokerage::{LongShort, OrderLeg, OrderStatus, OrderUpdate, Position};
pub use market::{Bar, BarStatus, Quote};
