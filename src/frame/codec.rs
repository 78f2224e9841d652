//! `tokio_util` codec adapter for the transport framing.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Frame, HEADER_LEN, SIZE_FIELD_LEN, decode_header, encode_frame};
use crate::error::TransportError;

/// Default ceiling on a single inbound frame, matching the broker default
/// for `socket.request.max.bytes`.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 100 * 1024 * 1024;

/// Stateless codec turning a byte stream into [`Frame`]s and back.
///
/// Decoding fails with [`TransportError::CorruptHeader`] when the size
/// field is smaller than a correlation id or larger than the configured
/// maximum, and with [`TransportError::Truncated`] when the stream ends
/// inside a frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    max_frame_length: usize,
}

impl FrameCodec {
    /// Create a codec rejecting frames whose size field exceeds
    /// `max_frame_length`.
    #[must_use]
    pub const fn new(max_frame_length: usize) -> Self { Self { max_frame_length } }
}

impl Default for FrameCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_LENGTH) }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let Some(header) = decode_header(&src[..HEADER_LEN]) else {
            let size = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
            return Err(TransportError::CorruptHeader { size });
        };
        if header.size as usize > self.max_frame_length {
            return Err(TransportError::CorruptHeader { size: header.size });
        }
        let needed = SIZE_FIELD_LEN + header.size as usize;
        if src.len() < needed {
            src.reserve(needed - src.len());
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        let payload = src.split_to(header.payload_len()).freeze();
        Ok(Some(Frame {
            correlation_id: header.correlation_id,
            payload,
        }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(TransportError::Truncated {
                buffered: buf.len(),
            }),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(item.correlation_id, &item.payload, dst)?;
        Ok(())
    }
}
