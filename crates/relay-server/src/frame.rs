//! Signal frame envelope parsing.
//!
//! Only the routing field is inspected. Everything else in the object is
//! opaque and the original text is what gets forwarded.

use relay_core::{FrameError, Identity};
use serde_json::Value;

/// One inbound message that passed envelope validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalFrame {
    target: Identity,
    raw: String,
}

impl SignalFrame {
    /// Parse `raw` as a JSON object and extract the string at `target_field`.
    pub fn parse(raw: &str, target_field: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(map) = value else {
            return Err(FrameError::NotAnObject);
        };
        let target = match map.get(target_field) {
            None => return Err(FrameError::MissingTarget(target_field.to_string())),
            Some(Value::String(s)) if s.is_empty() => {
                return Err(FrameError::EmptyTarget(target_field.to_string()));
            }
            Some(Value::String(s)) => Identity::from(s.as_str()),
            Some(_) => return Err(FrameError::TargetNotString(target_field.to_string())),
        };
        Ok(Self {
            target,
            raw: raw.to_string(),
        })
    }

    /// Decode a binary message as UTF-8, then [`parse`](Self::parse) it.
    pub fn parse_bytes(raw: &[u8], target_field: &str) -> Result<Self, FrameError> {
        let text = std::str::from_utf8(raw).map_err(|_| FrameError::NotUtf8)?;
        Self::parse(text, target_field)
    }

    #[cfg(test)]
    fn target(&self) -> &Identity {
        &self.target
    }

    #[cfg(test)]
    fn raw(&self) -> &str {
        &self.raw
    }

    /// Consume the frame, returning the target and the original text.
    pub fn into_parts(self) -> (Identity, String) {
        (self.target, self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const FIELD: &str = "target_identity";

    #[test]
    fn extracts_target() {
        let raw = r#"{"target_identity":"bob@x.com","type":"offer","sdp":"v=0"}"#;
        let frame = SignalFrame::parse(raw, FIELD).unwrap();
        assert_eq!(frame.target().as_str(), "bob@x.com");
    }

    #[test]
    fn raw_text_is_kept_byte_for_byte() {
        // Whitespace, key order and unicode escapes must survive.
        let raw = "{ \"sdp\" : \"a\\u00e9\",\n  \"target_identity\":\"bob@x.com\" , \"n\": 1.50 }";
        let frame = SignalFrame::parse(raw, FIELD).unwrap();
        assert_eq!(frame.raw(), raw);
        let (target, text) = frame.into_parts();
        assert_eq!(target.as_str(), "bob@x.com");
        assert_eq!(text, raw);
    }

    #[test]
    fn custom_routing_field() {
        let raw = r#"{"to":"carol@x.com","type":"candidate"}"#;
        let frame = SignalFrame::parse(raw, "to").unwrap();
        assert_eq!(frame.target().as_str(), "carol@x.com");
        assert_matches!(
            SignalFrame::parse(raw, FIELD),
            Err(FrameError::MissingTarget(f)) if f == FIELD
        );
    }

    #[test]
    fn invalid_json() {
        assert_matches!(SignalFrame::parse("{not json", FIELD), Err(FrameError::Json(_)));
        assert_matches!(SignalFrame::parse("", FIELD), Err(FrameError::Json(_)));
    }

    #[test]
    fn non_object_json() {
        assert_matches!(SignalFrame::parse("[1,2]", FIELD), Err(FrameError::NotAnObject));
        assert_matches!(SignalFrame::parse("\"bob\"", FIELD), Err(FrameError::NotAnObject));
        assert_matches!(SignalFrame::parse("null", FIELD), Err(FrameError::NotAnObject));
    }

    #[test]
    fn missing_target() {
        assert_matches!(
            SignalFrame::parse(r#"{"type":"offer"}"#, FIELD),
            Err(FrameError::MissingTarget(_))
        );
    }

    #[test]
    fn target_wrong_type() {
        assert_matches!(
            SignalFrame::parse(r#"{"target_identity":42}"#, FIELD),
            Err(FrameError::TargetNotString(_))
        );
        assert_matches!(
            SignalFrame::parse(r#"{"target_identity":null}"#, FIELD),
            Err(FrameError::TargetNotString(_))
        );
    }

    #[test]
    fn empty_target() {
        assert_matches!(
            SignalFrame::parse(r#"{"target_identity":""}"#, FIELD),
            Err(FrameError::EmptyTarget(_))
        );
    }

    #[test]
    fn binary_utf8_is_accepted() {
        let raw = br#"{"target_identity":"bob@x.com"}"#;
        let frame = SignalFrame::parse_bytes(raw, FIELD).unwrap();
        assert_eq!(frame.raw().as_bytes(), raw);
    }

    #[test]
    fn binary_non_utf8_is_rejected() {
        assert_matches!(
            SignalFrame::parse_bytes(&[0xff, 0xfe, 0x00], FIELD),
            Err(FrameError::NotUtf8)
        );
    }
}
