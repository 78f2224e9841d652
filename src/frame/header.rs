//! Frame header encoding and decoding.

use std::io;

use bytes::{BufMut, BytesMut};

use super::{CORRELATION_ID_LEN, HEADER_LEN};

/// Fixed-size header preceding every payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Bytes following the size field: correlation id plus payload.
    pub size: u32,
    /// Identifier routing the frame to its waiter.
    pub correlation_id: u32,
}

impl FrameHeader {
    /// Build the header for a payload of `payload_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidInput`] when the payload does not fit
    /// in the 32-bit size field.
    pub fn for_payload(correlation_id: u32, payload_len: usize) -> io::Result<Self> {
        let size = payload_len
            .checked_add(CORRELATION_ID_LEN)
            .and_then(|size| u32::try_from(size).ok())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("payload of {payload_len} bytes exceeds the frame size field"),
                )
            })?;
        Ok(Self {
            size,
            correlation_id,
        })
    }

    /// Number of payload bytes following the header.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        (self.size as usize).saturating_sub(CORRELATION_ID_LEN)
    }

    /// Number of bytes the whole frame occupies on the wire.
    #[must_use]
    pub fn wire_len(&self) -> usize { HEADER_LEN + self.payload_len() }

    /// Append the header to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.put_u32(self.size);
        dst.put_u32(self.correlation_id);
    }
}

/// Decode a header from the first [`HEADER_LEN`] bytes of `src`.
///
/// Returns `None` if `src` is too short or the size field cannot cover the
/// correlation id. Callers treat `None` as a fatal parse error.
///
/// # Examples
///
/// ```
/// use streamwire::frame::{FrameHeader, decode_header};
///
/// let bytes = [0, 0, 0, 7, 0, 0, 0, 42];
/// let header = decode_header(&bytes).expect("valid header");
/// assert_eq!(header.correlation_id, 42);
/// assert_eq!(header.payload_len(), 3);
///
/// assert_eq!(decode_header(&[0, 0, 0, 2, 0, 0, 0, 1]), None);
/// ```
#[must_use]
pub fn decode_header(src: &[u8]) -> Option<FrameHeader> {
    let header: &[u8; HEADER_LEN] = src.get(..HEADER_LEN)?.try_into().ok()?;
    let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if (size as usize) < CORRELATION_ID_LEN {
        return None;
    }
    let correlation_id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    Some(FrameHeader {
        size,
        correlation_id,
    })
}

/// Append a complete frame for `payload` to `dst`.
///
/// # Errors
///
/// Returns an error if the payload does not fit in the size field.
pub fn encode_frame(correlation_id: u32, payload: &[u8], dst: &mut BytesMut) -> io::Result<()> {
    let header = FrameHeader::for_payload(correlation_id, payload.len())?;
    dst.reserve(header.wire_len());
    header.write_to(dst);
    dst.extend_from_slice(payload);
    Ok(())
}
