// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet encoding contract and the default JSON codec.
//!
//! A packet is a [`Header`] plus an ordered list of typed [`Payload`]s.
//! Decoding never fails as a whole: whatever could be recovered is returned
//! in a [`DecodedPacket`] together with the errors met on the way, so the
//! callback layer can report them through the usual error channel.

use crate::error::{now_millis, ErrorCode, ErrorPayload, LabmeshError, Result};
use crate::topic::{Identity, TransmissionKind};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Type tag of error payloads.
pub const ERROR_TAG: &str = "error";
/// Type tag of bare status payloads (`{"code": 0}` means OK).
pub const STATUS_TAG: &str = "status";
/// Type tag of plain string payloads.
pub const STRING_TAG: &str = "string";
/// Type tag of free-form JSON payloads.
pub const JSON_TAG: &str = "json";

/// Packet header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub sender: Identity,
    pub kind: TransmissionKind,
    pub subject: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub timestamp_ms: u64,
}

impl Header {
    pub fn new(sender: Identity, kind: TransmissionKind, subject: Vec<String>) -> Self {
        Self {
            sender,
            kind,
            subject,
            correlation_id: None,
            timestamp_ms: now_millis(),
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// One typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub body: Value,
}

impl Payload {
    pub fn new(type_tag: impl Into<String>, body: Value) -> Self {
        Self {
            type_tag: type_tag.into(),
            body,
        }
    }

    pub fn string(text: impl Into<String>) -> Self {
        Self::new(STRING_TAG, Value::String(text.into()))
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        let body = serde_json::to_value(value).map_err(|e| LabmeshError::Codec(e.to_string()))?;
        Ok(Self::new(JSON_TAG, body))
    }

    pub fn error(error: &ErrorPayload) -> Self {
        // ErrorPayload only holds plain fields, serialization cannot fail.
        let body = serde_json::to_value(error).unwrap_or(Value::Null);
        Self::new(ERROR_TAG, body)
    }

    #[must_use]
    pub fn status_ok() -> Self {
        Self::new(STATUS_TAG, serde_json::json!({ "code": ErrorCode::None.as_i32() }))
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.type_tag == ERROR_TAG
    }

    #[must_use]
    pub fn is_status_ok(&self) -> bool {
        self.type_tag == STATUS_TAG && self.body.get("code") == Some(&Value::from(0))
    }

    /// Error record carried by an error-typed payload.
    #[must_use]
    pub fn as_error(&self) -> Option<ErrorPayload> {
        if !self.is_error() {
            return None;
        }
        serde_json::from_value(self.body.clone()).ok()
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        if self.type_tag == STRING_TAG {
            self.body.as_str()
        } else {
            None
        }
    }
}

/// Result of decoding raw bytes.
///
/// A missing header or payload list means the packet could not be decoded
/// far enough to run a callback.
#[derive(Debug, Clone, Default)]
pub struct DecodedPacket {
    pub header: Option<Header>,
    pub payloads: Option<Vec<Payload>>,
    pub errors: Vec<ErrorPayload>,
}

/// Abstract packet codec.
pub trait PacketCodec: Send + Sync {
    /// Encode a header and payload list into wire bytes.
    fn encode(&self, header: &Header, payloads: &[Payload]) -> Result<Vec<u8>>;

    /// Decode wire bytes. Errors are collected, never raised.
    fn decode(&self, bytes: &[u8]) -> DecodedPacket;
}

/// Validates the body of one payload type.
pub type PayloadValidator = Arc<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

/// Type-tag keyed payload factory.
///
/// Unknown tags are decoding errors; a body rejected by its validator is a
/// validation error. In both cases the payload is dropped from the list.
pub struct PayloadRegistry {
    validators: RwLock<HashMap<String, PayloadValidator>>,
}

impl PayloadRegistry {
    /// Registry without any known types.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            validators: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the built-in `error`, `status`, `string` and `json` types.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register(ERROR_TAG, |body| {
            serde_json::from_value::<ErrorPayload>(body.clone())
                .map(|_| ())
                .map_err(|e| format!("malformed error payload: {}", e))
        });
        registry.register(STATUS_TAG, |body| match body.get("code") {
            Some(code) if code.is_i64() => Ok(()),
            _ => Err("status payload needs an integer 'code'".to_string()),
        });
        registry.register(STRING_TAG, |body| {
            if body.is_string() {
                Ok(())
            } else {
                Err("string payload body is not a string".to_string())
            }
        });
        registry.register(JSON_TAG, |_| Ok(()));
        registry
    }

    /// Register (or replace) the validator for a type tag.
    /// Returns `true` if the tag was not known before.
    pub fn register<F>(&self, type_tag: impl Into<String>, validator: F) -> bool
    where
        F: Fn(&Value) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validators
            .write()
            .insert(type_tag.into(), Arc::new(validator))
            .is_none()
    }

    #[must_use]
    pub fn is_known(&self, type_tag: &str) -> bool {
        self.validators.read().contains_key(type_tag)
    }

    /// Check one payload against its registered type.
    pub fn check(&self, payload: &Payload) -> std::result::Result<(), ErrorPayload> {
        let validator = self.validators.read().get(&payload.type_tag).cloned();
        match validator {
            None => Err(ErrorPayload::decoding(format!(
                "unknown payload type '{}'",
                payload.type_tag
            ))),
            Some(validate) => validate(&payload.body).map_err(|reason| {
                ErrorPayload::validation(format!("payload '{}': {}", payload.type_tag, reason))
            }),
        }
    }
}

impl Default for PayloadRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    header: &'a Header,
    payloads: &'a [Payload],
}

/// Default codec: a JSON envelope `{"header": ..., "payloads": [...]}`.
pub struct JsonCodec {
    registry: Arc<PayloadRegistry>,
}

impl JsonCodec {
    #[must_use]
    pub fn new(registry: Arc<PayloadRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PayloadRegistry> {
        &self.registry
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new(Arc::new(PayloadRegistry::with_builtins()))
    }
}

impl PacketCodec for JsonCodec {
    fn encode(&self, header: &Header, payloads: &[Payload]) -> Result<Vec<u8>> {
        serde_json::to_vec(&EnvelopeRef { header, payloads })
            .map_err(|e| LabmeshError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> DecodedPacket {
        let mut packet = DecodedPacket::default();

        let envelope: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                packet
                    .errors
                    .push(ErrorPayload::decoding(format!("malformed envelope: {}", e)));
                return packet;
            }
        };

        match envelope.get("header").cloned().map(serde_json::from_value::<Header>) {
            Some(Ok(header)) => packet.header = Some(header),
            Some(Err(e)) => packet
                .errors
                .push(ErrorPayload::decoding(format!("malformed header: {}", e))),
            None => packet
                .errors
                .push(ErrorPayload::decoding("envelope has no header")),
        }

        let Some(items) = envelope.get("payloads").and_then(Value::as_array) else {
            packet
                .errors
                .push(ErrorPayload::decoding("envelope has no payload list"));
            return packet;
        };

        let mut payloads = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match serde_json::from_value::<Payload>(item.clone()) {
                Ok(payload) => match self.registry.check(&payload) {
                    Ok(()) => payloads.push(payload),
                    Err(error) => packet.errors.push(error),
                },
                Err(e) => packet
                    .errors
                    .push(ErrorPayload::decoding(format!("payload #{}: {}", index, e))),
            }
        }
        packet.payloads = Some(payloads);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header::new(
            Identity::new("plant", "motor").expect("identity"),
            TransmissionKind::Req,
            vec!["ping".into()],
        )
        .with_correlation_id("c0ffee")
    }

    #[test]
    fn test_json_codec_round_trip() {
        let codec = JsonCodec::default();
        let payloads = vec![Payload::string("ping"), Payload::status_ok()];
        let bytes = codec.encode(&header(), &payloads).expect("encode");

        let packet = codec.decode(&bytes);
        assert!(packet.errors.is_empty());
        assert_eq!(packet.header, Some(header()));
        assert_eq!(packet.payloads, Some(payloads));
    }

    #[test]
    fn test_decode_garbage_reports_single_error() {
        let packet = JsonCodec::default().decode(b"\x00\x01not json");
        assert!(packet.header.is_none());
        assert!(packet.payloads.is_none());
        assert_eq!(packet.errors.len(), 1);
        assert_eq!(packet.errors[0].code, ErrorCode::Decoding);
    }

    #[test]
    fn test_unknown_and_invalid_payloads_are_dropped() {
        let codec = JsonCodec::default();
        let bytes = serde_json::to_vec(&serde_json::json!({
            "header": header(),
            "payloads": [
                {"type": "string", "body": "ok"},
                {"type": "teapot", "body": 1},
                {"type": "string", "body": 42},
                {"body": "no type"}
            ]
        }))
        .expect("serialize");

        let packet = codec.decode(&bytes);
        assert!(packet.header.is_some());
        assert_eq!(packet.payloads.as_deref(), Some(&[Payload::string("ok")][..]));
        let codes: Vec<_> = packet.errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![ErrorCode::Decoding, ErrorCode::Validation, ErrorCode::Decoding]
        );
    }

    #[test]
    fn test_missing_header_keeps_payloads() {
        let bytes = br#"{"payloads": [{"type": "json", "body": {"x": 1}}]}"#;
        let packet = JsonCodec::default().decode(bytes);
        assert!(packet.header.is_none());
        assert_eq!(packet.payloads.map(|p| p.len()), Some(1));
        assert_eq!(packet.errors.len(), 1);
    }

    #[test]
    fn test_error_payload_helpers() {
        let error = ErrorPayload::processing("handler failed");
        let payload = Payload::error(&error);
        assert!(payload.is_error());
        assert_eq!(payload.as_error(), Some(error));
        assert!(Payload::status_ok().is_status_ok());
        assert_eq!(Payload::string("pong").as_str(), Some("pong"));
    }

    #[test]
    fn test_custom_payload_type() {
        let registry = Arc::new(PayloadRegistry::empty());
        assert!(registry.register("vec3", |body| match body.as_array() {
            Some(items) if items.len() == 3 => Ok(()),
            _ => Err("expected 3 components".into()),
        }));
        assert!(registry.is_known("vec3"));
        assert!(!registry.is_known("string"));

        let good = Payload::new("vec3", serde_json::json!([1.0, 2.0, 3.0]));
        let bad = Payload::new("vec3", serde_json::json!([1.0]));
        assert!(registry.check(&good).is_ok());
        assert_eq!(
            registry.check(&bad).map_err(|e| e.code),
            Err(ErrorCode::Validation)
        );
    }
}
