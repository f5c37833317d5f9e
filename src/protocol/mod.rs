//! Protocol module - wire format, framing, and RPC message types.
//!
//! This module implements the binary protocol spoken with the dispatch
//! server:
//! - 10-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - MsgPack message bodies for every RPC

mod frame_buffer;
mod messages;
mod wire_format;

pub use frame_buffer::{Frame, FrameBuffer};
pub use messages::{
    Ack, CallRequest, CallResponse, DispatchMessage, Invocation, InvocationReport, LogRecord,
    OpenDispatchRequest, Outcome, RegisterHandlerRequest, RegisterHandlerResponse, TriggerOption,
    UnregisterHandlerRequest,
};
pub use wire_format::{kind, rpc, Header, HEADER_SIZE, MAX_PAYLOAD_SIZE, ONE_WAY_REQUEST_ID};
