//! On-air frame construction and parsing.
//!
//! ```text
//! AA AA AA AA ‖ enc(D3) ‖ enc(header) ‖ enc(payload) ‖ enc(crc(header)) ‖ enc(crc(payload))
//! header = pid ‖ nid(2) ‖ src ‖ dst ‖ message_id [‖ hops]
//! ```
//!
//! `enc` is the nibble symbol code. Both check sequences are big-endian and
//! cover the raw section they follow; the payload check covers the ciphertext,
//! so a relay can validate a frame without holding the key.

extern crate alloc;
use alloc::vec::Vec;

use wavemesh_crypto::KeySet;
use wavemesh_crypto::padding::{padded_len, zero_pad_to};

use crate::codec::crc::{crc, verify_crc};
use crate::codec::symbol;
use crate::constants::{
    CRC_LEN, MAX_CHUNK_PAYLOAD_LEN, MAX_FRAME_LEN, MIN_CHUNK_PAYLOAD_LEN, MIN_FRAME_LEN, PREAMBLE,
    PacketClass, START_OF_FRAME,
};
use crate::error::{CodecError, FrameError, FrameSection};
use crate::packet::pid::Pid;
use crate::types::{Did, MessageId, Nid};

/// Offset of the first header symbol within the on-air bytes.
const HEADER_SYMBOL_OFFSET: usize = PREAMBLE.len() + 2;

/// A validated frame. The payload is held exactly as it travels on the air:
/// ciphertext for encrypted PIDs, zero-padded plaintext otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub pid: Pid,
    pub nid: Nid,
    pub src: Did,
    pub dst: Did,
    pub message_id: MessageId,
    /// Hops left. Only carried on the air when `pid.multi_hop` is set.
    pub hops: u8,
    payload: Vec<u8>,
}

/// On-air payload length for `len` bytes of application data in `class`.
pub fn wire_payload_len(class: PacketClass, len: usize) -> Result<usize, FrameError> {
    match class.fixed_payload_len() {
        Some(fixed) if len <= fixed => Ok(fixed),
        Some(_) => Err(FrameError::Malformed("payload too long for packet class")),
        None => {
            let padded = padded_len(len).max(MIN_CHUNK_PAYLOAD_LEN);
            if padded > MAX_CHUNK_PAYLOAD_LEN {
                return Err(FrameError::Malformed("chunk payload too long"));
            }
            Ok(padded)
        }
    }
}

impl Frame {
    /// Build a frame whose payload goes on the air as given, zero-padded to
    /// the class size.
    ///
    /// Used for plaintext PIDs and for payloads that are already ciphertext.
    pub fn build(
        pid: Pid,
        nid: Nid,
        src: Did,
        dst: Did,
        message_id: MessageId,
        payload: &[u8],
    ) -> Result<Self, FrameError> {
        let len = wire_payload_len(pid.class, payload.len())?;
        let payload = zero_pad_to(payload, len)
            .ok_or(FrameError::Malformed("payload too long for packet class"))?;
        Ok(Frame {
            pid,
            nid,
            src,
            dst,
            message_id,
            hops: 0,
            payload,
        })
    }

    /// Build a frame, enciphering the padded payload under the key slot the
    /// PID names.
    pub fn seal(
        pid: Pid,
        nid: Nid,
        src: Did,
        dst: Did,
        message_id: MessageId,
        payload: &[u8],
        keys: &KeySet,
    ) -> Result<Self, FrameError> {
        let mut frame = Self::build(pid, nid, src, dst, message_id, payload)?;
        if let Some(slot) = pid.encryption.key_slot() {
            frame.payload = keys.encrypt(&frame.payload, slot)?;
        }
        Ok(frame)
    }

    /// Mark the frame multi-hop with `hops` hops left.
    #[must_use]
    pub fn with_hops(mut self, hops: u8) -> Self {
        self.pid.multi_hop = true;
        self.hops = hops;
        self
    }

    /// The payload as carried on the air.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Recover the padded plaintext payload.
    pub fn open(&self, keys: &KeySet) -> Result<Vec<u8>, FrameError> {
        match self.pid.encryption.key_slot() {
            Some(slot) => Ok(keys.decrypt(&self.payload, slot)?),
            None => Ok(self.payload.clone()),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.dst.is_broadcast()
    }

    /// The raw header bytes the header check sequence covers.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(self.pid.header_len());
        header.push(self.pid.to_byte());
        header.extend_from_slice(&self.nid.to_be_bytes());
        header.push(self.src.0);
        header.push(self.dst.0);
        header.push(self.message_id.0);
        if self.pid.multi_hop {
            header.push(self.hops);
        }
        header
    }

    /// Serialize to on-air bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = self.header_bytes();
        let mut raw = Vec::with_capacity(1 + header.len() + self.payload.len() + 2 * CRC_LEN);
        raw.push(START_OF_FRAME);
        raw.extend_from_slice(&header);
        raw.extend_from_slice(&self.payload);
        raw.extend_from_slice(&crc(&header).to_be_bytes());
        raw.extend_from_slice(&crc(&self.payload).to_be_bytes());

        let mut out = Vec::with_capacity(PREAMBLE.len() + raw.len() * 2);
        out.extend_from_slice(&PREAMBLE);
        symbol::encode_into(&raw, &mut out);
        out
    }

    /// Parse and validate on-air bytes.
    ///
    /// Checks run in a fixed order: length, preamble and start of frame,
    /// symbol validity, header fields, header CRC, payload CRC.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(FrameError::Malformed("frame too short"));
        }
        if bytes.len() > MAX_FRAME_LEN {
            return Err(FrameError::Malformed("frame too long"));
        }
        if bytes[..PREAMBLE.len()] != PREAMBLE {
            return Err(FrameError::Malformed("missing preamble"));
        }
        let symbols = &bytes[PREAMBLE.len()..];
        if symbols.len() % 2 != 0 {
            return Err(FrameError::Malformed("odd symbol stream length"));
        }
        match symbol::decode(&symbols[..2]) {
            Ok(sof) if sof[0] == START_OF_FRAME => {}
            _ => return Err(FrameError::Malformed("missing start of frame")),
        }

        let raw = symbol::decode(&symbols[2..]).map_err(|e| match e {
            CodecError::InvalidSymbol { offset, byte } => FrameError::InvalidSymbol {
                offset: offset + HEADER_SYMBOL_OFFSET,
                byte,
            },
            other => FrameError::from(other),
        })?;

        let pid = Pid::from_byte(raw[0])?;
        let header_len = pid.header_len();
        let payload_len = raw
            .len()
            .checked_sub(header_len + 2 * CRC_LEN)
            .ok_or(FrameError::Malformed("frame too short for header"))?;
        if !pid.class.permits_payload_len(payload_len) {
            return Err(FrameError::Malformed("payload length not permitted for class"));
        }

        let (header, rest) = raw.split_at(header_len);
        let (payload, crcs) = rest.split_at(payload_len);
        let header_crc = u32::from_be_bytes([crcs[0], crcs[1], crcs[2], crcs[3]]);
        let payload_crc = u32::from_be_bytes([crcs[4], crcs[5], crcs[6], crcs[7]]);

        if !verify_crc(header, header_crc) {
            return Err(FrameError::CorruptCrc {
                section: FrameSection::Header,
            });
        }
        if !verify_crc(payload, payload_crc) {
            return Err(FrameError::CorruptCrc {
                section: FrameSection::Payload,
            });
        }

        Ok(Frame {
            pid,
            nid: Nid::from_be_bytes([header[1], header[2]]),
            src: Did(header[3]),
            dst: Did(header[4]),
            message_id: MessageId(header[5]),
            hops: if pid.multi_hop { header[6] } else { 0 },
            payload: payload.to_vec(),
        })
    }

    /// The frame as a relay forwards it: one hop fewer, ciphertext untouched.
    ///
    /// Returns `None` for single-hop frames and frames with no hops left.
    pub fn relayed(&self) -> Option<Frame> {
        if !self.pid.multi_hop || self.hops == 0 {
            return None;
        }
        let mut next = self.clone();
        next.hops -= 1;
        Some(next)
    }

    /// Identity of the frame independent of its remaining hop count, so the
    /// same message seen via two relays compares equal.
    pub fn relay_key(&self) -> u32 {
        let header = self.header_bytes();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header[..crate::constants::HEADER_LEN]);
        hasher.update(&self.payload);
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Encryption;
    use wavemesh_crypto::{CipherKey, KeySlot};
    use wavemesh_test_vectors::frames::FrameVector;

    fn vector_keys() -> KeySet {
        let v = wavemesh_test_vectors::frames::load();
        let key = |s: &str| {
            let bytes = hex::decode(s).expect("invalid hex key");
            CipherKey::try_from(bytes.as_slice()).expect("key must be 16 bytes")
        };
        KeySet::new()
            .with(KeySlot::Network, key(&v.keys.network))
            .with(KeySlot::Stream, key(&v.keys.stream))
            .with(KeySlot::Access, key(&v.keys.access))
    }

    fn frame_from_vector(fv: &FrameVector, keys: &KeySet) -> Frame {
        let pid = Pid::from_byte(u8::from_str_radix(&fv.pid, 16).unwrap()).unwrap();
        let payload = hex::decode(&fv.payload).unwrap();
        let frame = Frame::seal(
            pid.with_multi_hop(false),
            Nid(fv.nid as u16),
            Did(fv.src as u8),
            Did(fv.dst as u8),
            MessageId(fv.message_id as u8),
            &payload,
            keys,
        )
        .expect("vector frame must build");
        match fv.hops {
            Some(h) => frame.with_hops(h as u8),
            None => frame,
        }
    }

    fn sample_frame() -> Frame {
        Frame::seal(
            Pid::new(PacketClass::Single, Encryption::Network),
            Nid(0x1234),
            Did(5),
            Did::COORDINATOR,
            MessageId(7),
            b"hello",
            &vector_keys(),
        )
        .unwrap()
    }

    #[test]
    fn test_frame_vectors_build() {
        let v = wavemesh_test_vectors::frames::load();
        let keys = vector_keys();
        assert_eq!(hex::encode(PREAMBLE), v.preamble);

        for fv in &v.vectors {
            let frame = frame_from_vector(fv, &keys);
            assert_eq!(
                hex::encode(frame.header_bytes()),
                fv.raw_header,
                "header mismatch for: {}",
                fv.description
            );
            assert_eq!(
                hex::encode(frame.payload()),
                fv.ciphertext,
                "ciphertext mismatch for: {}",
                fv.description
            );
            assert_eq!(
                format!("{:08x}", crc(&frame.header_bytes())),
                fv.header_crc,
                "header crc mismatch for: {}",
                fv.description
            );
            assert_eq!(
                format!("{:08x}", crc(frame.payload())),
                fv.payload_crc,
                "payload crc mismatch for: {}",
                fv.description
            );
            assert_eq!(
                hex::encode(frame.to_bytes()),
                fv.wire,
                "wire mismatch for: {}",
                fv.description
            );
        }
    }

    #[test]
    fn test_frame_vectors_parse() {
        let v = wavemesh_test_vectors::frames::load();
        let keys = vector_keys();

        for fv in &v.vectors {
            let wire = hex::decode(&fv.wire).unwrap();
            let frame = Frame::parse(&wire).expect("vector wire must parse");
            assert_eq!(frame, frame_from_vector(fv, &keys), "{}", fv.description);
            assert_eq!(
                hex::encode(frame.open(&keys).unwrap()),
                fv.payload,
                "plaintext mismatch for: {}",
                fv.description
            );
        }
    }

    #[test]
    fn test_build_pads_short_payload() {
        let frame = Frame::build(
            Pid::new(PacketClass::Admin, Encryption::None),
            Nid(1),
            Did(0),
            Did(1),
            MessageId(0),
            &[0x42],
        )
        .unwrap();
        assert_eq!(frame.payload().len(), 32);
        assert_eq!(frame.payload()[0], 0x42);
        assert!(frame.payload()[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_build_rejects_oversized_payload() {
        let pid = Pid::new(PacketClass::Single, Encryption::None);
        let err = Frame::build(pid, Nid(1), Did(0), Did(1), MessageId(0), &[0; 17]).unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));

        let pid = Pid::new(PacketClass::Block, Encryption::None);
        assert!(Frame::build(pid, Nid(1), Did(0), Did(1), MessageId(0), &[0; 65]).is_err());
    }

    #[test]
    fn test_chunk_payload_rounds_up() {
        let pid = Pid::new(PacketClass::Block, Encryption::None);
        for (len, expected) in [(0, 8), (1, 8), (8, 8), (9, 16), (63, 64), (64, 64)] {
            let frame = Frame::build(pid, Nid(1), Did(0), Did(1), MessageId(0), &vec![1; len])
                .unwrap();
            assert_eq!(frame.payload().len(), expected, "len {len}");
        }
    }

    #[test]
    fn test_seal_requires_key() {
        let pid = Pid::new(PacketClass::Single, Encryption::Stream);
        let keys = KeySet::new().with(KeySlot::Network, CipherKey::new([0; 16]));
        let err = Frame::seal(pid, Nid(1), Did(0), Did(1), MessageId(0), b"x", &keys).unwrap_err();
        assert!(matches!(err, FrameError::Crypto(_)));
    }

    #[test]
    fn test_roundtrip_every_class() {
        let keys = vector_keys();
        let classes = [
            (PacketClass::Single, 16),
            (PacketClass::Block, 40),
            (PacketClass::Stream, 64),
            (PacketClass::Admin, 32),
            (PacketClass::Ack, 8),
            (PacketClass::Control, 16),
        ];
        for (class, len) in classes {
            for encryption in [
                Encryption::None,
                Encryption::Network,
                Encryption::Stream,
                Encryption::Access,
            ] {
                let payload: Vec<u8> = (0..len as u8).collect();
                let frame = Frame::seal(
                    Pid::new(class, encryption),
                    Nid(0xA55A),
                    Did(3),
                    Did(4),
                    MessageId(200),
                    &payload,
                    &keys,
                )
                .unwrap();
                let parsed = Frame::parse(&frame.to_bytes()).unwrap();
                assert_eq!(parsed, frame, "{class:?}/{encryption:?}");
                assert_eq!(parsed.open(&keys).unwrap(), payload, "{class:?}/{encryption:?}");
            }
        }
    }

    #[test]
    fn test_every_single_bit_flip_is_rejected() {
        let wire = sample_frame().to_bytes();
        for i in 0..wire.len() {
            for bit in 0..8 {
                let mut corrupted = wire.clone();
                corrupted[i] ^= 1 << bit;
                assert!(
                    Frame::parse(&corrupted).is_err(),
                    "flip of bit {bit} in byte {i} was accepted"
                );
            }
        }
    }

    #[test]
    fn test_parse_error_order() {
        let wire = sample_frame().to_bytes();

        assert_eq!(
            Frame::parse(&wire[..10]),
            Err(FrameError::Malformed("frame too short"))
        );

        let mut bad_preamble = wire.clone();
        bad_preamble[0] = 0xAB;
        assert_eq!(
            Frame::parse(&bad_preamble),
            Err(FrameError::Malformed("missing preamble"))
        );

        let mut bad_sof = wire.clone();
        bad_sof[4] = symbol::SYMBOLS[0];
        assert_eq!(
            Frame::parse(&bad_sof),
            Err(FrameError::Malformed("missing start of frame"))
        );

        let mut bad_symbol = wire.clone();
        bad_symbol[20] = 0x00;
        assert_eq!(
            Frame::parse(&bad_symbol),
            Err(FrameError::InvalidSymbol {
                offset: 20,
                byte: 0x00
            })
        );

        // Re-encode with a valid but different source DID so only the
        // header check sequence disagrees.
        let mut raw = symbol::decode(&wire[4..]).unwrap();
        raw[4] ^= 0x01;
        let mut wrong_header = PREAMBLE.to_vec();
        symbol::encode_into(&raw, &mut wrong_header);
        assert_eq!(
            Frame::parse(&wrong_header),
            Err(FrameError::CorruptCrc {
                section: FrameSection::Header
            })
        );

        let mut raw = symbol::decode(&wire[4..]).unwrap();
        raw[10] ^= 0x80;
        let mut wrong_payload = PREAMBLE.to_vec();
        symbol::encode_into(&raw, &mut wrong_payload);
        assert_eq!(
            Frame::parse(&wrong_payload),
            Err(FrameError::CorruptCrc {
                section: FrameSection::Payload
            })
        );
    }

    #[test]
    fn test_parse_rejects_length_class_mismatch() {
        // A single-class header followed by a 24-byte payload.
        let frame = Frame::build(
            Pid::new(PacketClass::Block, Encryption::None),
            Nid(1),
            Did(1),
            Did(2),
            MessageId(1),
            &[7; 24],
        )
        .unwrap();
        let mut raw = symbol::decode(&frame.to_bytes()[4..]).unwrap();
        raw[1] = Pid::new(PacketClass::Single, Encryption::None).to_byte();
        let mut wire = PREAMBLE.to_vec();
        symbol::encode_into(&raw, &mut wire);
        assert_eq!(
            Frame::parse(&wire),
            Err(FrameError::Malformed("payload length not permitted for class"))
        );
    }

    #[test]
    fn test_relayed_decrements_hops_and_keeps_ciphertext() {
        let frame = sample_frame().with_hops(2);
        let once = frame.relayed().unwrap();
        assert_eq!(once.hops, 1);
        assert_eq!(once.payload(), frame.payload());
        assert_eq!(once.relay_key(), frame.relay_key());

        let twice = once.relayed().unwrap();
        assert_eq!(twice.hops, 0);
        assert!(twice.relayed().is_none());
        assert!(sample_frame().relayed().is_none());

        let parsed = Frame::parse(&once.to_bytes()).unwrap();
        assert_eq!(parsed.hops, 1);
        assert!(parsed.pid.multi_hop);
    }
}
