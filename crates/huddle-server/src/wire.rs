//! Broadcast wire format: `{ type, data, timestamp }`.

use huddle_core::events::Broadcast;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct WireEvent<'a> {
    #[serde(flatten)]
    pub broadcast: &'a Broadcast,
    pub timestamp: String,
}

impl<'a> WireEvent<'a> {
    pub fn new(broadcast: &'a Broadcast) -> Self {
        Self {
            broadcast,
            timestamp: now_iso8601(),
        }
    }
}

fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Serialize a broadcast as a text frame.
pub fn to_frame(broadcast: &Broadcast) -> Result<String, serde_json::Error> {
    serde_json::to_string(&WireEvent::new(broadcast))
}
