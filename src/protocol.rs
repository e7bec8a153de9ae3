//! Fixed-size packet codec for RbVault
//!
//! Every store operation and every read result travels as exactly 12 bytes:
//!
//! ```text
//! +----------------+-----------------+-----------------+
//! | key: i32 (LE)  | insert: i32 (LE)| payload: [u8; 4]|
//! +----------------+-----------------+-----------------+
//! ```
//!
//! Both integers are little-endian regardless of host byte order. The
//! insert flag is only meaningful on write requests and is zero on read
//! responses.

use crate::error::{RbVaultError, Result};
use crate::store::{Entry, Payload, PAYLOAD_LEN};
use nom::{
    bytes::complete::take,
    combinator::{all_consuming, map},
    number::complete::le_i32,
    sequence::tuple,
    IResult,
};
use serde::{Deserialize, Serialize};

/// Length of every packet on the wire.
pub const PACKET_LEN: usize = 12;

/// Wire representation of a write request or read response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub key: i32,
    pub insert_flag: i32,
    pub payload: Payload,
}

impl Packet {
    /// Request inserting or replacing `key`
    pub fn upsert(key: i32, payload: Payload) -> Self {
        Self { key, insert_flag: 1, payload }
    }

    /// Request deleting `key`
    pub fn delete(key: i32) -> Self {
        Self { key, insert_flag: 0, payload: Payload::default() }
    }

    /// Response carrying an extracted entry
    pub fn response(entry: Entry) -> Self {
        Self { key: entry.key, insert_flag: 0, payload: entry.payload }
    }

    pub fn is_insert(&self) -> bool {
        self.insert_flag != 0
    }

    pub fn entry(&self) -> Entry {
        Entry::new(self.key, self.payload)
    }

    /// Serialize packet to its wire form
    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        encode(self)
    }
}

/// Lay out a packet as 12 little-endian bytes
pub fn encode(packet: &Packet) -> [u8; PACKET_LEN] {
    let mut bytes = [0u8; PACKET_LEN];
    bytes[0..4].copy_from_slice(&packet.key.to_le_bytes());
    bytes[4..8].copy_from_slice(&packet.insert_flag.to_le_bytes());
    bytes[8..12].copy_from_slice(packet.payload.as_bytes());
    bytes
}

/// Parse a packet, rejecting any buffer that is not exactly 12 bytes
pub fn decode(bytes: &[u8]) -> Result<Packet> {
    if bytes.len() != PACKET_LEN {
        return Err(RbVaultError::MalformedPacket { len: bytes.len() });
    }
    let (_, packet) = all_consuming(packet_parser)(bytes)
        .map_err(|_| RbVaultError::MalformedPacket { len: bytes.len() })?;
    Ok(packet)
}

fn packet_parser(input: &[u8]) -> IResult<&[u8], Packet> {
    map(
        tuple((le_i32, le_i32, take(PAYLOAD_LEN))),
        |(key, insert_flag, payload_bytes)| {
            let mut payload = [0u8; PAYLOAD_LEN];
            payload.copy_from_slice(payload_bytes);
            Packet { key, insert_flag, payload: Payload::new(payload) }
        },
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let packet = Packet::upsert(10, Payload::from_token("abcd"));
        assert_eq!(
            encode(&packet),
            [10, 0, 0, 0, 1, 0, 0, 0, b'a', b'b', b'c', b'd']
        );

        let negative = Packet::delete(-2);
        assert_eq!(
            negative.to_bytes(),
            [0xfe, 0xff, 0xff, 0xff, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_decode_roundtrip() {
        let packets = [
            Packet::upsert(i32::MAX, Payload::from_token("wxyz")),
            Packet::upsert(i32::MIN, Payload::from_token("q")),
            Packet::delete(0),
            Packet { key: 3, insert_flag: -7, payload: Payload::new([0xff, 0, 0x80, 1]) },
        ];
        for packet in packets {
            let bytes = encode(&packet);
            assert_eq!(bytes.len(), PACKET_LEN);
            assert_eq!(decode(&bytes).unwrap(), packet);
        }
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(matches!(decode(&[0u8; 11]), Err(RbVaultError::MalformedPacket { len: 11 })));
        assert!(matches!(decode(&[0u8; 13]), Err(RbVaultError::MalformedPacket { len: 13 })));
        assert!(matches!(decode(&[]), Err(RbVaultError::MalformedPacket { len: 0 })));
    }

    #[test]
    fn test_insert_flag_is_truthy() {
        let mut packet = Packet::delete(5);
        assert!(!packet.is_insert());
        packet.insert_flag = 42;
        assert!(packet.is_insert());
        assert_eq!(Packet::response(Entry::new(5, Payload::from_token("ab"))).insert_flag, 0);
    }
}
