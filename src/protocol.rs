//! Control channel wire format
//!
//! The server relays short text messages between named clients. This client
//! only needs the identification packet, the capture trigger and the report
//! line addressed to the SQL sink.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Inbound text that starts a capture cycle
pub const TRIGGER_TOKEN: &str = "[HX_ARD] 1";

/// Recipient tag of outbound reports
pub const REPORT_TARGET: &str = "SERVER_SQL";

/// Identifier this client announces on every connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `[id]` packet sent right after connecting
    pub fn packet(&self) -> String {
        format!("[{}]", self.0)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// The capture trigger
    Trigger,
    /// Anything else, trimmed, shown to the operator only
    Text(String),
}

impl InboundMessage {
    /// Classify raw inbound text
    pub fn classify(raw: &str) -> Self {
        let text = raw.trim();
        if text == TRIGGER_TOKEN {
            InboundMessage::Trigger
        } else {
            InboundMessage::Text(text.to_string())
        }
    }

    /// Decode a received buffer (invalid UTF-8 is replaced, not rejected)
    pub fn decode(bytes: &[u8]) -> Self {
        Self::classify(&String::from_utf8_lossy(bytes))
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self, InboundMessage::Trigger)
    }
}

/// Wear percentage in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct WearEstimate(f64);

impl WearEstimate {
    /// Create an estimate, clamping into range. NaN becomes 0.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 100.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for WearEstimate {
    /// Shortest round-trip text, always with a decimal point (`42.0`)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// One result line for the SQL sink
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundReport {
    pub image_path: String,
    pub wear: WearEstimate,
    pub timestamp: u64,
}

impl OutboundReport {
    pub fn new(image_path: impl Into<String>, wear: WearEstimate, timestamp: u64) -> Self {
        Self {
            image_path: image_path.into(),
            wear,
            timestamp,
        }
    }

    /// Report stamped with the current time
    pub fn now(image_path: impl Into<String>, wear: WearEstimate) -> Self {
        Self::new(image_path, wear, unix_timestamp())
    }

    /// Serialize to the newline-terminated wire line
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for OutboundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]:image_path:{} wear_percentage:{} timestamp:{}",
            REPORT_TARGET, self.image_path, self.wear, self.timestamp
        )
    }
}

/// Seconds since the unix epoch
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_packet() {
        assert_eq!(ClientIdentity::new("JETSON").packet(), "[JETSON]");
    }

    #[test]
    fn test_trigger_classification() {
        assert_eq!(InboundMessage::classify("[HX_ARD] 1"), InboundMessage::Trigger);
        assert_eq!(InboundMessage::classify("  [HX_ARD] 1\r\n"), InboundMessage::Trigger);
        assert!(InboundMessage::decode(b"\t[HX_ARD] 1\n").is_trigger());
    }

    #[test]
    fn test_near_misses_are_text() {
        assert_eq!(
            InboundMessage::classify("[HX_ARD] 0\n"),
            InboundMessage::Text("[HX_ARD] 0".to_string())
        );
        assert_eq!(
            InboundMessage::classify("[HX_ARD] 1 [HX_ARD] 1"),
            InboundMessage::Text("[HX_ARD] 1 [HX_ARD] 1".to_string())
        );
        assert_eq!(
            InboundMessage::classify("  hello server  "),
            InboundMessage::Text("hello server".to_string())
        );
    }

    #[test]
    fn test_report_line_format() {
        let report = OutboundReport::new("images/a.jpg", WearEstimate::new(42.0), 1000);
        assert_eq!(
            report.to_line(),
            "[SERVER_SQL]:image_path:images/a.jpg wear_percentage:42.0 timestamp:1000\n"
        );
    }

    #[test]
    fn test_wear_display_is_canonical() {
        assert_eq!(WearEstimate::new(10.0).to_string(), "10.0");
        assert_eq!(WearEstimate::new(87.5).to_string(), "87.5");
        assert_eq!(WearEstimate::new(100.0).to_string(), "100.0");
        assert_eq!(WearEstimate::new(0.0).to_string(), "0.0");
    }

    #[test]
    fn test_wear_clamped() {
        assert_eq!(WearEstimate::new(150.0).value(), 100.0);
        assert_eq!(WearEstimate::new(-3.0).value(), 0.0);
        assert_eq!(WearEstimate::new(f64::NAN).value(), 0.0);
    }

    #[test]
    fn test_report_now_has_timestamp() {
        let report = OutboundReport::now("images/b.jpg", WearEstimate::new(10.0));
        assert!(report.timestamp > 1_600_000_000);
    }
}
