use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::event::{
    DataEvent, ErrorFrame, ErrorFrameKind, EventKind, Heartbeat, StatusChange, StreamEvent,
    StreamStatus,
};
use super::subscription::StreamKind;

/// Turns decoded frames into typed events for one stream kind.
///
/// Classification looks only at the shape of the object, in this order:
/// heartbeat, server error, stream status, the business payload of the
/// stream kind, and finally a parse-failure error frame. It never fails.
#[derive(Debug, Clone, Copy)]
pub struct EventDispatcher {
    kind: StreamKind,
}

impl EventDispatcher {
    pub fn new(kind: StreamKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Decode and classify one frame of text
    pub fn classify_frame(&self, frame: &str, received_at: DateTime<Utc>) -> StreamEvent {
        match serde_json::from_str::<Value>(frame) {
            Ok(value) => self.classify(&value, received_at),
            Err(e) => StreamEvent::new(
                EventKind::Error(ErrorFrame::parse_failure(frame, format!("invalid JSON: {}", e))),
                received_at,
            ),
        }
    }

    pub fn classify(&self, value: &Value, received_at: DateTime<Utc>) -> StreamEvent {
        StreamEvent::new(self.classify_kind(value), received_at)
    }

    fn classify_kind(&self, value: &Value) -> EventKind {
        let Some(object) = value.as_object() else {
            return EventKind::Error(ErrorFrame::parse_failure(
                value.to_string(),
                "frame is not a JSON object",
            ));
        };

        if let Some(heartbeat) = heartbeat(object) {
            return EventKind::Heartbeat(heartbeat);
        }
        if let Some(frame) = server_error(object) {
            return EventKind::Error(frame);
        }
        if let Some(Value::String(status)) = object.get("StreamStatus") {
            return EventKind::Status(StatusChange {
                status: StreamStatus::from(status.as_str()),
            });
        }

        let data = match self.kind {
            StreamKind::Bars => payload(value).map(DataEvent::Bar),
            StreamKind::Quotes => payload(value).map(DataEvent::Quote),
            StreamKind::Orders => payload(value).map(DataEvent::Order),
            StreamKind::Positions => payload(value).map(DataEvent::Position),
        };
        match data {
            Ok(data) => EventKind::Data(data),
            Err(e) => EventKind::Error(ErrorFrame::parse_failure(
                value.to_string(),
                format!("unrecognized {} frame: {}", self.kind, e),
            )),
        }
    }
}

fn payload<T: DeserializeOwned>(value: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(value)
}

/// `{"Heartbeat": <n|bool>}` with nothing beside it but `Timestamp`
fn heartbeat(object: &Map<String, Value>) -> Option<Heartbeat> {
    let marker = object.get("Heartbeat")?;
    if object.keys().any(|k| k != "Heartbeat" && k != "Timestamp") {
        return None;
    }

    let sequence = match marker {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    let timestamp = object
        .get("Timestamp")
        .and_then(|ts| DateTime::<Utc>::deserialize(ts).ok());

    Some(Heartbeat {
        sequence,
        timestamp,
    })
}

/// Any object whose `Error` field is a string
fn server_error(object: &Map<String, Value>) -> Option<ErrorFrame> {
    let code = object.get("Error")?.as_str()?;
    let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

    Some(ErrorFrame {
        kind: ErrorFrameKind::Server,
        code: Some(code.to_string()),
        message: text("Message"),
        account_id: text("AccountID"),
        symbol: text("Symbol"),
        raw: None,
    })
}
