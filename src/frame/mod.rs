//! Wire framing for multiplexed requests and replies.
//!
//! Every frame on the wire is laid out as:
//!
//! ```text
//! +----------------+------------------+-----------------+
//! | size: u32 (BE) | correlation_id   | payload         |
//! |                | u32 (BE)         |                 |
//! +----------------+------------------+-----------------+
//! ```
//!
//! `size` counts every byte after the size field, so it is always at least
//! [`CORRELATION_ID_LEN`]. Protocol metadata such as the API key, version,
//! and client id travel inside the payload and are opaque to the transport.

mod codec;
mod header;

pub use codec::{DEFAULT_MAX_FRAME_LENGTH, FrameCodec};
pub use header::{FrameHeader, decode_header, encode_frame};

use bytes::Bytes;

/// Width of the big-endian size prefix.
pub const SIZE_FIELD_LEN: usize = 4;
/// Width of the big-endian correlation id.
pub const CORRELATION_ID_LEN: usize = 4;
/// Bytes preceding the payload of every frame.
pub const HEADER_LEN: usize = SIZE_FIELD_LEN + CORRELATION_ID_LEN;

/// One decoded unit of wire data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Correlation id echoed by the peer.
    pub correlation_id: u32,
    /// Payload bytes following the header.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from its parts.
    #[must_use]
    pub fn new(correlation_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            correlation_id,
            payload: payload.into(),
        }
    }

    /// Total bytes this frame occupies on the wire.
    #[must_use]
    pub fn wire_len(&self) -> usize { HEADER_LEN + self.payload.len() }
}
