//! MsgPack codec for wire payloads.
//!
//! All frame payloads are MessagePack, encoded with `to_vec_named` so structs
//! serialize as maps with field names. That keeps the wire format evolvable:
//! fields can be added without breaking older peers.
//!
//! # Example
//!
//! ```
//! use dispatch_agent::PayloadCodec;
//!
//! let encoded = PayloadCodec::encode(&"hello").unwrap();
//! let decoded: String = PayloadCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

use crate::error::Result;

/// MessagePack codec for wire payloads.
///
/// Struct-as-map format (`to_vec_named`), never positional arrays.
pub struct PayloadCodec;

impl PayloadCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
