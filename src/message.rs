//! Request and reply body types.
//!
//! The transport moves opaque payload bytes. [`Message`] is the bound the
//! [`RpcClient`](crate::client::RpcClient) places on typed request and reply
//! bodies; any type deriving bincode's [`Encode`] and [`BorrowDecode`]
//! qualifies through the blanket implementation.

use bincode::{
    BorrowDecode,
    Encode,
    borrow_decode_from_slice,
    config,
    encode_to_vec,
    error::{DecodeError, EncodeError},
};

/// Body type carried in a request or reply frame.
///
/// # Examples
///
/// ```
/// use streamwire::message::Message;
///
/// #[derive(bincode::Encode, bincode::BorrowDecode, Debug, PartialEq)]
/// struct ApiVersions {
///     client_id: u16,
/// }
///
/// let bytes = ApiVersions { client_id: 7 }.to_bytes().expect("encode");
/// let (decoded, used) = ApiVersions::from_bytes(&bytes).expect("decode");
/// assert_eq!(decoded, ApiVersions { client_id: 7 });
/// assert_eq!(used, bytes.len());
/// ```
pub trait Message: Encode + for<'de> BorrowDecode<'de, ()> {
    /// Encode the body with bincode's standard configuration.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodeError`] if the body cannot be encoded.
    fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> { encode_to_vec(self, config::standard()) }

    /// Decode a body, returning it with the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if `bytes` is not a valid encoding.
    fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), DecodeError>
    where
        Self: Sized,
    {
        borrow_decode_from_slice(bytes, config::standard())
    }
}

impl<T> Message for T where for<'de> T: Encode + BorrowDecode<'de, ()> {}
