//! Envelopes of the Spotify dealer push service.
//!
//! The dealer sends JSON text frames. Frames of kind `message` carry a
//! topic `uri`, HTTP-like `headers` and a list of `payloads`. For the
//! connect-state topics the payloads are base64 strings, each decoding to
//! a protobuf buffer:
//!
//! ```json
//! {
//!     "type": "message",
//!     "uri": "hm://connect-state/v1/connect/volume",
//!     "headers": {
//!         "Content-Type": "application/x-protobuf",
//!         "Spotify-Connection-Id": "NzYz..."
//!     },
//!     "payloads": ["CICAAg=="]
//! }
//! ```
//!
//! Every field may be missing. Fields are extracted from a generic JSON
//! value, and a missing or mistyped field simply reads as absent.
//!
//! The binary payloads are decoded by [`volume`] and [`content_settings`].

pub mod content_settings;
pub mod volume;

#[cfg(test)]
pub(crate) mod protos;

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Value};

use crate::{error::Result, protocol};

/// Discriminator in the `type` field of an envelope.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Kind {
    /// Topic message with payloads.
    Message,

    /// Keep-alive sent by the client.
    Ping,

    /// Answer to a keep-alive.
    Pong,

    /// Command request, answered by the client with a reply.
    Request,

    /// Any other or missing discriminator.
    #[default]
    Unknown,
}

impl Kind {
    const MESSAGE: &'static str = "message";
    const PING: &'static str = "ping";
    const PONG: &'static str = "pong";
    const REQUEST: &'static str = "request";

    fn from_wire(s: &str) -> Self {
        match s {
            Self::MESSAGE => Self::Message,
            Self::PING => Self::Ping,
            Self::PONG => Self::Pong,
            Self::REQUEST => Self::Request,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => write!(f, "{}", Self::MESSAGE),
            Self::Ping => write!(f, "{}", Self::PING),
            Self::Pong => write!(f, "{}", Self::PONG),
            Self::Request => write!(f, "{}", Self::REQUEST),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single entry of the `payloads` array.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Base64 encoded binary payload.
    Encoded(String),

    /// Inline JSON, as sent with some requests. Not decoded further.
    Json(Value),
}

impl Payload {
    /// Decodes the base64 text of an encoded payload.
    ///
    /// Returns `None` for inline JSON payloads.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the text is not standard base64.
    pub fn decode(&self) -> Option<Result<Vec<u8>>> {
        match self {
            Self::Encoded(text) => Some(decode_payload(text)),
            Self::Json(_) => None,
        }
    }
}

/// Decoded JSON frame received from the dealer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    pub kind: Kind,
    pub uri: Option<String>,
    pub headers: Map<String, Value>,
    pub payloads: Vec<Payload>,
}

impl Envelope {
    /// Header that carries the identifier of the dealer connection.
    pub const CONNECTION_ID_HEADER: &'static str = "Spotify-Connection-Id";

    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not valid JSON.
    pub fn parse(text: &str) -> Result<Self> {
        let value = protocol::json::<Value>(text, "dealer")?;
        Ok(Self::from_value(value))
    }

    /// Extracts an envelope from a generic JSON value.
    ///
    /// Absent or mistyped fields read as absent. A value that is not a JSON
    /// object yields an envelope of [`Kind::Unknown`].
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::default();
        };

        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .map_or(Kind::Unknown, Kind::from_wire);

        let uri = match object.remove("uri") {
            Some(Value::String(uri)) => Some(uri),
            _ => None,
        };

        let headers = match object.remove("headers") {
            Some(Value::Object(headers)) => headers,
            _ => Map::new(),
        };

        let payloads = match object.remove("payloads") {
            Some(Value::Array(payloads)) => payloads
                .into_iter()
                .map(|payload| match payload {
                    Value::String(text) => Payload::Encoded(text),
                    other => Payload::Json(other),
                })
                .collect(),
            _ => Vec::new(),
        };

        Self {
            kind,
            uri,
            headers,
            payloads,
        }
    }

    /// Looks up a string header, matching the name case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_str())
    }

    /// The connection id, when present and not blank.
    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.header(Self::CONNECTION_ID_HEADER)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Iterates over the base64 strings among the payloads.
    pub fn payloads(&self) -> impl Iterator<Item = &str> {
        self.payloads.iter().filter_map(|payload| match payload {
            Payload::Encoded(text) => Some(text.as_str()),
            Payload::Json(_) => None,
        })
    }

    /// Text of the keep-alive frame sent by the client.
    #[must_use]
    pub fn ping_frame() -> String {
        serde_json::json!({ "type": Kind::PING }).to_string()
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(uri) = &self.uri {
            write!(f, " {uri}")?;
        }
        write!(f, " ({} payloads)", self.payloads.len())
    }
}

/// Decodes a standard base64 payload.
///
/// # Errors
///
/// Returns `InvalidArgument` when the text is not standard base64.
pub fn decode_payload(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_message() {
        let envelope = Envelope::parse(
            r#"{
                "type": "message",
                "uri": "hm://connect-state/v1/connect/volume",
                "headers": {"Spotify-Connection-Id": "abc123", "Content-Type": "application/x-protobuf"},
                "payloads": ["CICAAg==", {"inline": true}]
            }"#,
        )
        .unwrap();

        assert_eq!(envelope.kind, Kind::Message);
        assert_eq!(
            envelope.uri.as_deref(),
            Some("hm://connect-state/v1/connect/volume")
        );
        assert_eq!(envelope.connection_id(), Some("abc123"));
        assert_eq!(envelope.payloads().collect::<Vec<_>>(), vec!["CICAAg=="]);
        assert_eq!(envelope.payloads.len(), 2);
    }

    #[test]
    fn absent_fields_are_not_errors() {
        let envelope = Envelope::parse(r#"{"type": "pong"}"#).unwrap();
        assert_eq!(envelope.kind, Kind::Pong);
        assert_eq!(envelope.uri, None);
        assert!(envelope.headers.is_empty());
        assert_eq!(envelope.payloads().count(), 0);
    }

    #[test]
    fn mistyped_fields_read_as_absent() {
        let envelope =
            Envelope::parse(r#"{"type": 7, "uri": [], "headers": "x", "payloads": {}}"#).unwrap();
        assert_eq!(envelope, Envelope::default());

        let envelope = Envelope::parse("[1, 2, 3]").unwrap();
        assert_eq!(envelope.kind, Kind::Unknown);
    }

    #[test]
    fn malformed_json_fails() {
        assert!(Envelope::parse("{\"type\": \"message\"").is_err());
        assert!(Envelope::parse("not json").is_err());
    }

    #[test]
    fn connection_id_must_be_non_blank_string() {
        let envelope = Envelope::parse(
            r#"{"type": "message", "headers": {"spotify-connection-id": "  "}}"#,
        )
        .unwrap();
        assert_eq!(envelope.connection_id(), None);

        let envelope =
            Envelope::parse(r#"{"type": "message", "headers": {"Spotify-Connection-Id": 42}}"#)
                .unwrap();
        assert_eq!(envelope.connection_id(), None);

        let envelope = Envelope::parse(
            r#"{"type": "message", "headers": {"spotify-connection-id": "xyz"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.connection_id(), Some("xyz"));
    }

    #[test]
    fn ping_frame_is_exact() {
        assert_eq!(Envelope::ping_frame(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn decodes_base64() {
        assert_eq!(decode_payload("CICAAg==").unwrap(), vec![0x08, 0x80, 0x80, 0x02]);
        let err = decode_payload("not base64!").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
