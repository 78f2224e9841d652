//! Pluggable body encoding for the RPC client.
//!
//! [`Serializer`] turns typed request bodies into payload bytes and reply
//! payloads back into typed bodies. [`BincodeSerializer`] is the default and
//! stands in for a real Kafka API codec.

use std::error::Error;

use crate::message::Message;

/// Encodes request bodies and decodes reply bodies.
pub trait Serializer {
    /// Serialize `value` into payload bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    fn serialize<M: Message>(&self, value: &M) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>>;

    /// Deserialize a body from `bytes`, returning it with the bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be parsed into `M`.
    fn deserialize<M: Message>(
        &self,
        bytes: &[u8],
    ) -> Result<(M, usize), Box<dyn Error + Send + Sync>>;
}

/// Serializer using `bincode` with its standard configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn serialize<M: Message>(&self, value: &M) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>> {
        value
            .to_bytes()
            .map_err(|error| Box::new(error) as Box<dyn Error + Send + Sync>)
    }

    fn deserialize<M: Message>(
        &self,
        bytes: &[u8],
    ) -> Result<(M, usize), Box<dyn Error + Send + Sync>> {
        M::from_bytes(bytes).map_err(|error| Box::new(error) as Box<dyn Error + Send + Sync>)
    }
}

#[cfg(test)]
mod tests {
    use super::{BincodeSerializer, Serializer};

    #[derive(bincode::Encode, bincode::BorrowDecode, Debug, PartialEq)]
    struct Produce {
        partition: u32,
        records: Vec<u8>,
    }

    #[test]
    fn truncated_reply_fails_to_decode() {
        let bytes = BincodeSerializer
            .serialize(&Produce {
                partition: 3,
                records: vec![1, 2, 3, 4],
            })
            .expect("encode");
        let result = BincodeSerializer.deserialize::<Produce>(&bytes[..bytes.len() - 2]);
        assert!(result.is_err());
    }

    #[test]
    fn reports_bytes_consumed() {
        let mut bytes = BincodeSerializer
            .serialize(&Produce {
                partition: 1,
                records: Vec::new(),
            })
            .expect("encode");
        let body_len = bytes.len();
        bytes.extend_from_slice(&[0xff, 0xff]);
        let (decoded, used) = BincodeSerializer
            .deserialize::<Produce>(&bytes)
            .expect("decode");
        assert_eq!(decoded.partition, 1);
        assert_eq!(used, body_len);
    }
}
