//! Wire format encoding and decoding.
//!
//! Implements the 10-byte frame header:
//! ```text
//! ┌────────┬────────┬───────────┬───────────┐
//! │ Kind   │ RPC    │ Req ID    │ Length    │
//! │ 1 byte │ 1 byte │ 4 bytes   │ 4 bytes   │
//! │        │        │ uint32 BE │ uint32 BE │
//! └────────┴────────┴───────────┴───────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{AgentError, Result};

/// Header size in bytes (fixed, exactly 10).
pub const HEADER_SIZE: usize = 10;

/// Maximum payload size (16 MB). Reports and invocations are small; anything
/// larger indicates a corrupt stream.
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Request id used for fire-and-forget frames that expect no response.
pub const ONE_WAY_REQUEST_ID: u32 = 0;

/// Frame kind constants.
pub mod kind {
    /// Client-to-server call.
    pub const REQUEST: u8 = 1;
    /// Successful response to a request.
    pub const RESPONSE: u8 = 2;
    /// Error response to a request.
    pub const ERROR: u8 = 3;
    /// Server-initiated dispatch message (no matching request).
    pub const PUSH: u8 = 4;

    /// Check that a kind byte is one of the known kinds.
    #[inline]
    pub fn is_valid(kind: u8) -> bool {
        (REQUEST..=PUSH).contains(&kind)
    }
}

/// RPC identifier constants for the `rpc` header byte.
pub mod rpc {
    /// Register a handler, returns the server-assigned id.
    pub const REGISTER_HANDLER: u8 = 1;
    /// Unregister a handler by id.
    pub const UNREGISTER_HANDLER: u8 = 2;
    /// Report the outcome of one invocation.
    pub const REPORT_INVOCATION: u8 = 3;
    /// Initiate the dispatch session; the server pushes from then on.
    pub const OPEN_DISPATCH: u8 = 4;
    /// Pass-through API call.
    pub const CALL: u8 = 5;
    /// Unused on PUSH frames.
    pub const NONE: u8 = 0;
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame kind (see [`kind`]).
    pub kind: u8,
    /// RPC identifier (see [`rpc`]; `rpc::NONE` on pushes).
    pub rpc: u8,
    /// Request identifier correlating responses to requests (0 = one-way).
    pub request_id: u32,
    /// Payload length in bytes.
    pub payload_len: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: u8, rpc: u8, request_id: u32, payload_len: u32) -> Self {
        Self {
            kind,
            rpc,
            request_id,
            payload_len,
        }
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.kind;
        buf[1] = self.rpc;
        buf[2..6].copy_from_slice(&self.request_id.to_be_bytes());
        buf[6..10].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Decode a header from the first `HEADER_SIZE` bytes of `buf`.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the buffer is too short or the kind byte
    /// is unknown.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(AgentError::Protocol(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        let header = Self {
            kind: buf[0],
            rpc: buf[1],
            request_id: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            payload_len: u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]),
        };

        if !kind::is_valid(header.kind) {
            return Err(AgentError::Protocol(format!(
                "unknown frame kind: {}",
                header.kind
            )));
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let header = Header::new(kind::REQUEST, rpc::REGISTER_HANDLER, 42, 100);
        let bytes = header.encode();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_encode_is_big_endian() {
        let header = Header::new(kind::PUSH, rpc::NONE, 0x0102_0304, 0x0A0B_0C0D);
        let bytes = header.encode();
        assert_eq!(&bytes[2..6], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[6..10], &[0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn test_decode_short_buffer() {
        let result = Header::decode(&[1, 2, 3]);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_unknown_kind() {
        let mut bytes = Header::new(kind::REQUEST, rpc::CALL, 1, 0).encode();
        bytes[0] = 0xFF;
        let result = Header::decode(&bytes);
        assert!(matches!(result, Err(crate::error::AgentError::Protocol(_))));
    }

    #[test]
    fn test_one_way_request_id() {
        let header = Header::new(kind::REQUEST, rpc::OPEN_DISPATCH, ONE_WAY_REQUEST_ID, 8);
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded.request_id, ONE_WAY_REQUEST_ID);
    }
}
