//! Broadcast event types and wire framing
//!
//! Events are framed as Server-Sent-Events text:
//!
//! ```text
//! event: <type>\n
//! data: <payload>\n
//! \n
//! ```
//!
//! An event with no payload still carries an empty `data:` line.

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};

/// Event type names pushed to viewers
pub mod kind {
    pub const TIMESTAMP: &str = "timestamp";
    pub const ANNOTATED_IMAGE: &str = "annotated_image";
    pub const RAW_IMAGE: &str = "raw_image";
    pub const REQUEST_START: &str = "llm_request_start";
    pub const PROMPT: &str = "prompt";
    pub const DESCRIPTION_START: &str = "llm_response_start";
    pub const DESCRIPTION: &str = "llm_response";
    pub const DESCRIPTION_STOP: &str = "llm_response_stop";
    pub const CLASSIFICATION_START: &str = "threat_response_start";
    pub const CLASSIFICATION: &str = "threat_response";
    pub const CLASSIFICATION_STOP: &str = "threat_response_stop";
    pub const PAUSE: &str = "pause_events";
    pub const RESUME: &str = "resume_events";
    pub const PING: &str = "ping";
}

/// Keepalive frame written by subscriber serving loops
pub const PING_FRAME: &[u8] = b"event: ping\n\n";

/// An event to be fanned out to every subscriber
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastEvent {
    /// Event type line
    pub event_type: Cow<'static, str>,
    /// Payload, `None` for signal-only events
    pub data: Option<Bytes>,
}

impl BroadcastEvent {
    /// Create an event with a payload
    pub fn new(event_type: impl Into<Cow<'static, str>>, data: impl Into<Bytes>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Some(data.into()),
        }
    }

    /// Create a payload-less event
    pub fn signal(event_type: impl Into<Cow<'static, str>>) -> Self {
        Self {
            event_type: event_type.into(),
            data: None,
        }
    }

    /// Format into the wire framing
    pub fn to_frame(&self) -> Bytes {
        let data = self.data.as_deref().unwrap_or_default();
        let mut buf = BytesMut::with_capacity(self.event_type.len() + data.len() + 16);

        buf.put_slice(b"event: ");
        buf.put_slice(self.event_type.as_bytes());
        buf.put_slice(b"\ndata: ");
        buf.put_slice(data);
        buf.put_slice(b"\n\n");

        buf.freeze()
    }

    /// Parse a single frame produced by [`BroadcastEvent::to_frame`]
    ///
    /// Returns `None` if the frame is not terminated by a blank line or has no
    /// event line. A frame without a data line (such as a keepalive) parses as
    /// a signal event.
    pub fn parse_frame(frame: &[u8]) -> Option<Self> {
        let body = frame.strip_suffix(b"\n\n")?;
        let text = std::str::from_utf8(body).ok()?;

        let (event_line, data_line) = match text.split_once('\n') {
            Some((event, data)) => (event, Some(data)),
            None => (text, None),
        };

        let event_type = event_line.strip_prefix("event: ")?;
        let data = match data_line {
            Some(line) => {
                let payload = line.strip_prefix("data: ").or(line.strip_prefix("data:"))?;
                if payload.is_empty() {
                    None
                } else {
                    Some(Bytes::copy_from_slice(payload.as_bytes()))
                }
            }
            None => None,
        };

        Some(Self {
            event_type: Cow::Owned(event_type.to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_with_data() {
        let event = BroadcastEvent::new("foo", "bar");
        assert_eq!(&event.to_frame()[..], b"event: foo\ndata: bar\n\n");
    }

    #[test]
    fn test_frame_without_data() {
        let event = BroadcastEvent::signal(kind::RESUME);
        assert_eq!(&event.to_frame()[..], b"event: resume_events\ndata: \n\n");

        // Empty payload frames the same as no payload
        let event = BroadcastEvent::new("foo", Bytes::new());
        assert_eq!(&event.to_frame()[..], b"event: foo\ndata: \n\n");
    }

    #[test]
    fn test_parse_frame() {
        let frame = BroadcastEvent::new("foo", "bar").to_frame();
        let parsed = BroadcastEvent::parse_frame(&frame).unwrap();

        assert_eq!(parsed, BroadcastEvent::new("foo", "bar"));
        assert_eq!(&parsed.to_frame()[..], b"event: foo\ndata: bar\n\n");
    }

    #[test]
    fn test_parse_signal_and_ping() {
        let frame = BroadcastEvent::signal(kind::PAUSE).to_frame();
        let parsed = BroadcastEvent::parse_frame(&frame).unwrap();
        assert_eq!(parsed.event_type, kind::PAUSE);
        assert!(parsed.data.is_none());

        let ping = BroadcastEvent::parse_frame(PING_FRAME).unwrap();
        assert_eq!(ping.event_type, kind::PING);
        assert!(ping.data.is_none());
    }

    #[test]
    fn test_parse_rejects_unterminated() {
        assert!(BroadcastEvent::parse_frame(b"event: foo\ndata: bar\n").is_none());
        assert!(BroadcastEvent::parse_frame(b"data: bar\n\n").is_none());
    }
}
