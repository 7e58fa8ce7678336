//! Payload conversion.
//!
//! Temporal's payload converter chain dispatches on a *runtime* value's
//! shape (is it `None`? raw bytes? a protobuf message? anything else?).
//! Rust doesn't have that kind of precondition-based dispatch without
//! reaching for `dyn Any`, so the boundary is made static instead: each
//! wire encoding has exactly one Rust shape that produces it. Plain
//! structs go through [`Json`] (the common case, `json/plain`); raw bytes
//! and `()` get their own concrete impls; a protobuf-style payload opts in
//! via [`ProtoJson`]. This keeps typed overloads at the user-facing API and
//! adapts to payload lists only at the boundary.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use temporal_core_protos::{Payload, Payloads};
use thiserror::Error;

pub const ENCODING_METADATA_KEY: &str = "encoding";
pub const MESSAGE_TYPE_METADATA_KEY: &str = "messageType";

pub const ENCODING_BINARY_NULL: &str = "binary/null";
pub const ENCODING_BINARY_PLAIN: &str = "binary/plain";
pub const ENCODING_JSON_PROTOBUF: &str = "json/protobuf";
pub const ENCODING_JSON_PLAIN: &str = "json/plain";

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("no registered payload converter accepts this value")]
    NoConverterAccepts,
    #[error("failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("codec failed to encode payload: {0}")]
    Codec(String),
}

#[derive(Debug, Error)]
pub enum DecodingError {
    #[error("payload is missing the `{ENCODING_METADATA_KEY}` metadata key")]
    MissingEncoding,
    #[error("payload encoding `{0}` is not recognized")]
    UnknownEncoding(String),
    #[error("payload encoding `{expected}` does not match the requested type's encoding `{actual}`")]
    EncodingMismatch { expected: String, actual: String },
    #[error("failed to deserialize value: {0}")]
    Deserialization(#[from] serde_json::Error),
    #[error("codec failed to decode payload: {0}")]
    Codec(String),
}

/// Implemented once per wire encoding a Rust type can round-trip through.
///
/// See the module docs for why this replaces the source's
/// precondition-chain dispatch.
pub trait PayloadConvertible: Sized {
    fn encoding() -> &'static str;
    fn to_bytes(&self) -> Result<Vec<u8>, EncodingError>;
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodingError>;
}

impl PayloadConvertible for () {
    fn encoding() -> &'static str {
        ENCODING_BINARY_NULL
    }

    fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(Vec::new())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodingError> {
        if bytes.is_empty() {
            Ok(())
        } else {
            Err(DecodingError::Deserialization(
                serde_json::from_slice::<()>(bytes).unwrap_err(),
            ))
        }
    }
}

impl PayloadConvertible for Vec<u8> {
    fn encoding() -> &'static str {
        ENCODING_BINARY_PLAIN
    }

    fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(self.clone())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodingError> {
        Ok(bytes.to_vec())
    }
}

/// Wraps any `Serialize + DeserializeOwned` value for the `json/plain`
/// encoding — the default sub-converter for "all other values".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize + DeserializeOwned> PayloadConvertible for Json<T> {
    fn encoding() -> &'static str {
        ENCODING_JSON_PLAIN
    }

    fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodingError> {
        Ok(Json(serde_json::from_slice(bytes)?))
    }
}

/// Wraps a protobuf-shaped value serialized as JSON (`json/protobuf`).
/// Without a message descriptor registry in this core, the JSON
/// serialization is whatever the type's own `Serialize` impl produces
/// (e.g. a `prost`-generated type with `pbjson`-style serde support).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoJson<T>(pub T);

impl<T: Serialize + DeserializeOwned> PayloadConvertible for ProtoJson<T> {
    fn encoding() -> &'static str {
        ENCODING_JSON_PROTOBUF
    }

    fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodingError> {
        Ok(ProtoJson(serde_json::from_slice(bytes)?))
    }
}

/// A byte-level transform applied after conversion on encode, and before
/// conversion on decode (compression, encryption, ...).
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: Payload) -> Result<Payload, EncodingError>;
    fn decode(&self, payload: Payload) -> Result<Payload, DecodingError>;
}

/// The default converter chain plus an optional codec chain.
///
/// `convert_value` encodes a typed value to a `Payload`; `convert_payload`
/// decodes one back.
#[derive(Clone, Default)]
pub struct DataConverter {
    codecs: Vec<Arc<dyn PayloadCodec>>,
    encode_common_attributes: bool,
}

impl DataConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codecs.push(codec);
        self
    }

    /// When enabled, [`crate::failure::encode_failure`] moves `message`/
    /// `stack_trace` into an `encoded_attributes` payload (run through this
    /// converter's codec chain) and blanks the plaintext fields, instead of
    /// leaving them in the clear.
    pub fn with_encode_common_attributes(mut self, on: bool) -> Self {
        self.encode_common_attributes = on;
        self
    }

    pub fn encode_common_attributes(&self) -> bool {
        self.encode_common_attributes
    }

    pub fn convert_value<T: PayloadConvertible>(&self, value: &T) -> Result<Payload, EncodingError> {
        let data = value.to_bytes()?;
        let mut metadata = HashMap::new();
        metadata.insert(
            ENCODING_METADATA_KEY.to_string(),
            T::encoding().as_bytes().to_vec(),
        );
        let mut payload = Payload { metadata, data };
        for codec in &self.codecs {
            payload = codec.encode(payload)?;
        }
        Ok(payload)
    }

    pub fn convert_payload<T: PayloadConvertible>(&self, payload: &Payload) -> Result<T, DecodingError> {
        let mut payload = payload.clone();
        for codec in self.codecs.iter().rev() {
            payload = codec.decode(payload)?;
        }
        let encoding = payload
            .metadata
            .get(ENCODING_METADATA_KEY)
            .ok_or(DecodingError::MissingEncoding)?;
        let encoding = String::from_utf8_lossy(encoding).to_string();
        if encoding != T::encoding() {
            return Err(DecodingError::EncodingMismatch {
                expected: T::encoding().to_string(),
                actual: encoding,
            });
        }
        T::from_bytes(&payload.data)
    }

    /// Converts a heterogeneous list of already-typed values into an
    /// ordered `Payloads`, for variadic signal/query/update argument packs.
    pub fn convert_values<T: PayloadConvertible>(
        &self,
        values: &[T],
    ) -> Result<Payloads, EncodingError> {
        let payloads = values
            .iter()
            .map(|v| self.convert_value(v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Payloads { payloads })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_round_trips_with_empty_data() {
        let dc = DataConverter::new();
        let payload = dc.convert_value(&()).unwrap();
        assert_eq!(
            payload.metadata.get(ENCODING_METADATA_KEY).unwrap(),
            ENCODING_BINARY_NULL.as_bytes()
        );
        assert!(payload.data.is_empty());
        let back: () = dc.convert_payload(&payload).unwrap();
        assert_eq!(back, ());
    }

    #[test]
    fn bytes_round_trip() {
        let dc = DataConverter::new();
        let original = vec![1u8, 2, 3, 4];
        let payload = dc.convert_value(&original).unwrap();
        assert_eq!(
            payload.metadata.get(ENCODING_METADATA_KEY).unwrap(),
            ENCODING_BINARY_PLAIN.as_bytes()
        );
        let back: Vec<u8> = dc.convert_payload(&payload).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn json_round_trip() {
        #[derive(Debug, Serialize, serde::Deserialize, PartialEq)]
        struct Order {
            id: u32,
            items: Vec<String>,
        }
        let dc = DataConverter::new();
        let order = Json(Order {
            id: 7,
            items: vec!["pizza".into(), "sides".into()],
        });
        let payload = dc.convert_value(&order).unwrap();
        assert_eq!(
            payload.metadata.get(ENCODING_METADATA_KEY).unwrap(),
            ENCODING_JSON_PLAIN.as_bytes()
        );
        let Json(back) = dc.convert_payload(&payload).unwrap();
        assert_eq!(back, order.0);
    }

    #[test]
    fn decoding_unknown_type_fails_with_mismatch() {
        let dc = DataConverter::new();
        let payload = dc.convert_value(&Json(42)).unwrap();
        let err = dc.convert_payload::<()>(&payload).unwrap_err();
        assert!(matches!(err, DecodingError::EncodingMismatch { .. }));
    }

    #[test]
    fn decoding_missing_encoding_fails() {
        let payload = Payload {
            metadata: HashMap::new(),
            data: vec![],
        };
        let dc = DataConverter::new();
        let err = dc.convert_payload::<()>(&payload).unwrap_err();
        assert!(matches!(err, DecodingError::MissingEncoding));
    }
}
