//! Point encoding.
//!
//! A store instance is bound to exactly one codec type. The default,
//! [`MsgPackCodec`], writes self-describing MessagePack for every value,
//! strings included, so a payload decodes into any destination whose shape
//! matches what was written and fails with `Error::Decode` otherwise.
//! [`JsonCodec`] trades size for payloads readable with `redis-cli`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::{Error, Result};

/// Serializes point values to member bytes and back.
pub trait Codec: Send + Sync {
    /// # Errors
    ///
    /// - `Error::Encode`: the value cannot be represented by this codec
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// # Errors
    ///
    /// - `Error::Decode`: `bytes` do not describe a `T`
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// MessagePack with named struct fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|err| Error::Encode(err.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|err| Error::Decode(err.to_string()))
    }
}

/// Compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|err| Error::Encode(err.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|err| Error::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Message {
        author: String,
        message: String,
    }

    fn sample() -> Message {
        Message {
            author: "Author 1".to_string(),
            message: "Message 1".to_string(),
        }
    }

    #[test]
    fn test_msgpack_round_trips_shapes() {
        let codec = MsgPackCodec;
        let bytes = codec.encode("hello").unwrap();
        assert_eq!(codec.decode::<String>(&bytes).unwrap(), "hello");

        let bytes = codec.encode(&sample()).unwrap();
        assert_eq!(codec.decode::<Message>(&bytes).unwrap(), sample());
        assert_eq!(*codec.decode::<Box<Message>>(&bytes).unwrap(), sample());

        let bytes = codec.encode(&-17_i64).unwrap();
        assert_eq!(codec.decode::<i64>(&bytes).unwrap(), -17);
    }

    #[test]
    fn test_msgpack_shape_mismatch_is_decode_error() {
        let codec = MsgPackCodec;
        let record = codec.encode(&sample()).unwrap();
        assert!(matches!(codec.decode::<String>(&record), Err(Error::Decode(_))));

        let text = codec.encode("just text").unwrap();
        assert!(matches!(codec.decode::<Message>(&text), Err(Error::Decode(_))));
    }

    #[test]
    fn test_msgpack_distinguishes_string_from_bytes_of_string() {
        // A raw UTF-8 payload is not a MessagePack string.
        let codec = MsgPackCodec;
        assert!(codec.decode::<String>(b"hello").is_err());
    }

    #[test]
    fn test_json_round_trip_and_mismatch() {
        let codec = JsonCodec;
        let bytes = codec.encode(&sample()).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"author":"Author 1","message":"Message 1"}"#
        );
        assert_eq!(codec.decode::<Message>(&bytes).unwrap(), sample());
        assert!(matches!(codec.decode::<String>(&bytes), Err(Error::Decode(_))));
    }

    #[test]
    fn test_json_rejects_non_string_keys() {
        let mut map = BTreeMap::new();
        map.insert((1_u8, 2_u8), 3_u8);
        assert!(matches!(JsonCodec.encode(&map), Err(Error::Encode(_))));
    }
}
