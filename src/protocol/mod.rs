//! Gateway wire protocol.
//!
//! This module defines the frames exchanged between a gateway and its peer, the
//! binary codec used to put them on the wire, and the transport abstraction the
//! I/O threads read from and write to.
//!
//! # Overview
//!
//! A single connection carries traffic for many logical clients. Each frame
//! names the client it belongs to (or, for replies, the command id of the
//! message it answers), so frames for different clients interleave freely on
//! one stream.
//!
//! Outbound frames are application [`Request`]s, [`Response`]s to requests the
//! peer sent us, and the two handshake messages used to obtain and activate a
//! client id. Inbound frames mirror them.
//!
//! # Key Components
//!
//! - [`Frame`]: Sum of the six frame kinds, selected on the wire by a tag byte.
//! - [`codec`]: Encode/decode of frames. All integers are big-endian.
//! - [`Transport`]: A stream that can be cloned for the reader and writer threads
//!   and shut down from a third.
//! - [`ProtocolTransport`]: Frame level wrapper over a [`Transport`].
//!
//! # Binary Format
//!
//! Each frame starts with a tag byte and a `u16` command id. Frames sent by the
//! peer have the high bit of the tag set. Payload-carrying frames end with a
//! `u32` length followed by the payload; lengths above the configured limit are
//! rejected rather than truncated.
//!
//! # See Also
//!
//! - [`gateway`](crate::gateway): Orchestrates the I/O threads built on this module.
use std::time::{SystemTime, UNIX_EPOCH};

pub mod codec;
mod frame;
mod request;
mod response;
mod transport;

pub use frame::{
    Frame, TAG_REQUEST, TAG_RESPONSE, TAG_SIGN_IN_REQUEST, TAG_SIGN_IN_RESPONSE,
    TAG_SIGN_UP_REQUEST, TAG_SIGN_UP_RESPONSE,
};
pub use request::{RawRequest, RawSignInRequest, RawSignUpRequest, Request};
pub use response::{RawResponse, RawSignInResponse, RawSignUpResponse, Response, STATUS_OK};
pub use transport::{ProtocolTransport, Transport, TransportError};

/// Seconds since the Unix epoch, the conventional value of frame `time` fields.
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
