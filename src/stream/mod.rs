//! Streaming endpoints: newline-delimited JSON over a long-lived HTTP response.
//!
//! A [`StreamSession`] owns one connection for one [`Subscription`]. Bytes
//! from the [`Connection`] are cut into frames by the [`FrameDecoder`],
//! classified by the [`EventDispatcher`] and handed out as [`StreamEvent`]s.
//! Stalls and disconnects are retried with exponential backoff.

mod dispatch;
mod event;
mod frame;
mod reconnect;
mod session;
mod subscription;
mod transport;

pub use dispatch::EventDispatcher;
pub use event::{
    DataEvent, ErrorFrame, ErrorFrameKind, EventKind, Heartbeat, StatusChange, StreamEvent,
    StreamStatus,
};
pub use frame::{Frame, FrameDecoder};
pub use reconnect::ReconnectConfig;
pub use session::{ConnectionState, StreamSession};
pub use subscription::{
    BarParams, BarUnit, StreamKind, Subscription, MAX_MINUTE_INTERVAL, MAX_QUOTE_SYMBOLS,
};
pub use transport::{Connection, Connector, HttpConnection, HttpConnector, STREAM_MEDIA_TYPE};
