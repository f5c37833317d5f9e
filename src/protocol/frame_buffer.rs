//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management and a small state
//! machine to handle fragmented frames:
//! - `WaitingForHeader`: need at least 10 bytes
//! - `WaitingForPayload`: header parsed, need N more payload bytes

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{AgentError, Result};

/// A complete frame extracted from the read stream.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (may be empty).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Encode the frame to contiguous wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    WaitingForHeader,
    WaitingForPayload { header: Header, remaining: u32 },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_payload: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default payload cap.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Create a frame buffer with a custom payload cap.
    pub fn with_max_payload(max_payload: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
            state: State::WaitingForHeader,
            max_payload,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for an invalid header or a payload that
    /// exceeds the cap; the buffer is unusable afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        match &self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return Ok(None);
                }

                let header = Header::decode(&self.buffer[..HEADER_SIZE])?;

                if header.payload_len > self.max_payload {
                    return Err(AgentError::Protocol(format!(
                        "payload size {} exceeds maximum {}",
                        header.payload_len, self.max_payload
                    )));
                }

                let _ = self.buffer.split_to(HEADER_SIZE);

                if header.payload_len == 0 {
                    return Ok(Some(Frame::new(header, Bytes::new())));
                }

                self.state = State::WaitingForPayload {
                    header,
                    remaining: header.payload_len,
                };

                self.try_extract_one()
            }

            State::WaitingForPayload { header, remaining } => {
                let remaining = *remaining as usize;

                if self.buffer.len() < remaining {
                    return Ok(None);
                }

                let payload = self.buffer.split_to(remaining).freeze();
                let header = *header;
                self.state = State::WaitingForHeader;

                Ok(Some(Frame::new(header, payload)))
            }
        }
    }

    /// Number of buffered bytes not yet assembled into frames.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check whether the buffer holds no pending bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::{kind, rpc};

    fn make_frame_bytes(frame_kind: u8, request_id: u32, payload: &[u8]) -> Vec<u8> {
        let header = Header::new(frame_kind, rpc::NONE, request_id, payload.len() as u32);
        Frame::new(header, Bytes::copy_from_slice(payload)).to_bytes()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(kind::RESPONSE, 42, b"hello");

        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.request_id, 42);
        assert_eq!(&frames[0].payload[..], b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = Vec::new();
        combined.extend(make_frame_bytes(kind::RESPONSE, 1, b"first"));
        combined.extend(make_frame_bytes(kind::PUSH, 0, b"second"));
        combined.extend(make_frame_bytes(kind::ERROR, 3, b"third"));

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].header.kind, kind::RESPONSE);
        assert_eq!(frames[1].header.kind, kind::PUSH);
        assert_eq!(frames[2].header.kind, kind::ERROR);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_delivery() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(kind::RESPONSE, 7, b"fragmented payload");

        // Header split across two pushes, payload across two more.
        assert!(buffer.push(&bytes[..4]).unwrap().is_empty());
        assert!(buffer.push(&bytes[4..HEADER_SIZE]).unwrap().is_empty());

        let mid = HEADER_SIZE + 6;
        assert!(buffer.push(&bytes[HEADER_SIZE..mid]).unwrap().is_empty());

        let frames = buffer.push(&bytes[mid..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], b"fragmented payload");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(kind::PUSH, 0, b"hi");

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(&all[0].payload[..], b"hi");
    }

    #[test]
    fn test_empty_payload_frame() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(kind::PUSH, 0, b"");

        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn test_max_payload_validation() {
        let mut buffer = FrameBuffer::with_max_payload(16);
        let header = Header::new(kind::RESPONSE, rpc::NONE, 1, 1000);

        let result = buffer.push(&header.encode());

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_complete_plus_partial() {
        let mut buffer = FrameBuffer::new();
        let first = make_frame_bytes(kind::RESPONSE, 1, b"one");
        let second = make_frame_bytes(kind::RESPONSE, 2, b"two");

        let mut data = first;
        data.extend_from_slice(&second[..5]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.request_id, 1);

        let frames = buffer.push(&second[5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.request_id, 2);
    }
}
