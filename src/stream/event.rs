use chrono::{DateTime, Utc};

use crate::types::{Bar, OrderUpdate, Position, Quote};

/// One classified frame, stamped with the time it arrived
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub received_at: DateTime<Utc>,
    pub kind: EventKind,
}

impl StreamEvent {
    pub fn new(kind: EventKind, received_at: DateTime<Utc>) -> Self {
        Self { received_at, kind }
    }

    pub fn data(&self) -> Option<&DataEvent> {
        match &self.kind {
            EventKind::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self.kind, EventKind::Heartbeat(_))
    }

    pub fn error_frame(&self) -> Option<&ErrorFrame> {
        match &self.kind {
            EventKind::Error(frame) => Some(frame),
            _ => None,
        }
    }

    /// The server announced it is about to drop this stream
    pub fn is_go_away(&self) -> bool {
        match &self.kind {
            EventKind::Status(change) => change.status == StreamStatus::GoAway,
            EventKind::Error(frame) => frame.is_go_away(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Data(DataEvent),
    Heartbeat(Heartbeat),
    Error(ErrorFrame),
    Status(StatusChange),
}

/// Business payload of the active stream
#[derive(Debug, Clone, PartialEq)]
pub enum DataEvent {
    Bar(Bar),
    Quote(Quote),
    Order(OrderUpdate),
    Position(Position),
}

/// Liveness frame; the server sends one after 5 s without data
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Heartbeat {
    pub sequence: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFrameKind {
    /// An error object sent by the server
    Server,
    /// A frame that was not JSON or matched no known shape
    ParseFailure,
    /// A frame longer than the configured maximum
    Oversized,
}

/// An error delivered as data; it never ends the stream by itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    pub kind: ErrorFrameKind,
    /// Server error title (`BadRequest`, `GoAway`, `Forbidden`, ...)
    pub code: Option<String>,
    pub message: Option<String>,
    pub account_id: Option<String>,
    pub symbol: Option<String>,
    /// Frame text for parse failures, truncated for oversized frames
    pub raw: Option<String>,
}

impl ErrorFrame {
    pub fn parse_failure(raw: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorFrameKind::ParseFailure,
            code: None,
            message: Some(message.into()),
            account_id: None,
            symbol: None,
            raw: Some(raw.into()),
        }
    }

    pub fn oversized(len: usize, limit: usize, head: impl Into<String>) -> Self {
        Self {
            kind: ErrorFrameKind::Oversized,
            code: None,
            message: Some(format!("frame exceeds {} bytes (at least {})", limit, len)),
            account_id: None,
            symbol: None,
            raw: Some(head.into()),
        }
    }

    pub fn is_go_away(&self) -> bool {
        self.kind == ErrorFrameKind::Server && self.code.as_deref() == Some("GoAway")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// The initial snapshot has been sent; updates follow
    EndSnapshot,
    /// The server is shutting down and will close the stream
    GoAway,
    Other(String),
}

impl From<&str> for StreamStatus {
    fn from(status: &str) -> Self {
        match status {
            "EndSnapshot" => StreamStatus::EndSnapshot,
            "GoAway" => StreamStatus::GoAway,
            other => StreamStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: StreamStatus,
}
