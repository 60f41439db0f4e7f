//! ESP3 packet model and codec.
//!
//! ```text
//! +------+--------+--------+---------+------+--------+------+----------+--------+
//! | 0x55 | len_hi | len_lo | opt_len | type | crc8_h | data | opt_data | crc8_d |
//! +------+--------+--------+---------+------+--------+------+----------+--------+
//! ```
//!
//! The header checksum covers `len_hi, len_lo, opt_len, type`; the payload
//! checksum covers `data ‖ opt_data`. Total wire length is
//! `7 + data.len() + opt_data.len()`.

use std::fmt;

use crate::device::Address;
use crate::error::{EncodingError, FramingError};

use super::crc::{checksum, checksum2};

/// Frame start marker.
pub const SYNC_BYTE: u8 = 0x55;
/// Sync + 4 header bytes + header CRC.
pub const HEADER_LEN: usize = 6;
/// Bytes of framing around data and optional data.
pub const FRAME_OVERHEAD: usize = 7;
/// Largest data section the 2-byte length field can describe.
pub const MAX_DATA_LEN: usize = u16::MAX as usize;
/// Largest optional section the 1-byte length field can describe.
pub const MAX_OPTIONAL_LEN: usize = u8::MAX as usize;

/// Sender id the transceiver replaces with its own base id.
pub const RADIO_SENDER_PLACEHOLDER: [u8; 4] = [0x00, 0xFF, 0xFF, 0xFF];
/// Status byte appended to outgoing radio telegrams.
pub const RADIO_TX_STATUS: u8 = 0x00;
/// Sub-telegram count requested for outgoing radio telegrams.
pub const RADIO_TX_SUBTELEGRAMS: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Radio = 0x01,
    Response = 0x02,
    RadioSubTel = 0x03,
    Event = 0x04,
    CommonCommand = 0x05,
    SmartAckCommand = 0x06,
    RemoteManCommand = 0x07,
    RadioMessage = 0x09,
    RadioAdvanced = 0x0A,
}

impl PacketType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PacketType {
    type Error = FramingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => PacketType::Radio,
            0x02 => PacketType::Response,
            0x03 => PacketType::RadioSubTel,
            0x04 => PacketType::Event,
            0x05 => PacketType::CommonCommand,
            0x06 => PacketType::SmartAckCommand,
            0x07 => PacketType::RemoteManCommand,
            0x09 => PacketType::RadioMessage,
            0x0A => PacketType::RadioAdvanced,
            other => return Err(FramingError::UnknownPacketType(other)),
        })
    }
}

/// One complete ESP3 frame.
///
/// Immutable once built. Outgoing packets are created with [`Packet::new`]
/// (checksums computed); incoming ones come from [`Packet::decode`], which keeps
/// the checksums exactly as received so [`Packet::validate`] can report them.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    packet_type: PacketType,
    data: Vec<u8>,
    optional: Vec<u8>,
    header_crc: u8,
    payload_crc: u8,
}

impl Packet {
    pub fn new(
        packet_type: PacketType,
        data: Vec<u8>,
        optional: Vec<u8>,
    ) -> Result<Self, EncodingError> {
        if data.len() > MAX_DATA_LEN {
            return Err(EncodingError::DataTooLong(data.len()));
        }
        if optional.len() > MAX_OPTIONAL_LEN {
            return Err(EncodingError::OptionalTooLong(optional.len()));
        }
        let header = header_bytes(packet_type, data.len(), optional.len());
        let header_crc = checksum(&header);
        let payload_crc = checksum2(&data, &optional);
        Ok(Packet {
            packet_type,
            data,
            optional,
            header_crc,
            payload_crc,
        })
    }

    /// Outgoing radio telegram (ERP1) addressed to `destination`.
    ///
    /// Data is `rorg ‖ user_data ‖ 00 FF FF FF ‖ 00`; the destination travels in
    /// the optional data together with the sub-telegram count, dBm and security
    /// level fields.
    pub fn radio(rorg: u8, user_data: &[u8], destination: Address) -> Result<Self, EncodingError> {
        let mut data = Vec::with_capacity(user_data.len() + 6);
        data.push(rorg);
        data.extend_from_slice(user_data);
        data.extend_from_slice(&RADIO_SENDER_PLACEHOLDER);
        data.push(RADIO_TX_STATUS);

        let mut optional = Vec::with_capacity(7);
        optional.push(RADIO_TX_SUBTELEGRAMS);
        optional.extend_from_slice(&destination.to_bytes());
        optional.push(0xFF); // dBm: send
        optional.push(0x00); // security level
        Packet::new(PacketType::Radio, data, optional)
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn optional(&self) -> &[u8] {
        &self.optional
    }

    /// Total length on the wire.
    pub fn wire_len(&self) -> usize {
        FRAME_OVERHEAD + self.data.len() + self.optional.len()
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        out.push(SYNC_BYTE);
        out.extend_from_slice(&header_bytes(
            self.packet_type,
            self.data.len(),
            self.optional.len(),
        ));
        out.push(self.header_crc);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.optional);
        out.push(self.payload_crc);
        out
    }

    /// Parse a complete frame starting at the sync byte.
    ///
    /// Checksums are carried over as received and not checked here; call
    /// [`Packet::validate`] before trusting the content.
    pub fn decode(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(FramingError::TooShort {
                expected: FRAME_OVERHEAD,
                actual: bytes.len(),
            });
        }
        if bytes[0] != SYNC_BYTE {
            return Err(FramingError::MissingSync(bytes[0]));
        }
        let data_len = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        let optional_len = bytes[3] as usize;
        let expected = FRAME_OVERHEAD + data_len + optional_len;
        if bytes.len() < expected {
            return Err(FramingError::TooShort {
                expected,
                actual: bytes.len(),
            });
        }
        let packet_type = PacketType::try_from(bytes[4])?;
        let data_start = HEADER_LEN;
        let optional_start = data_start + data_len;
        let optional_end = optional_start + optional_len;
        Ok(Packet {
            packet_type,
            data: bytes[data_start..optional_start].to_vec(),
            optional: bytes[optional_start..optional_end].to_vec(),
            header_crc: bytes[5],
            payload_crc: bytes[optional_end],
        })
    }

    /// Check both received checksums against the content.
    pub fn validate(&self) -> Result<(), FramingError> {
        let computed = checksum(&header_bytes(
            self.packet_type,
            self.data.len(),
            self.optional.len(),
        ));
        if computed != self.header_crc {
            return Err(FramingError::HeaderChecksum {
                computed,
                received: self.header_crc,
            });
        }
        let computed = checksum2(&self.data, &self.optional);
        if computed != self.payload_crc {
            return Err(FramingError::PayloadChecksum {
                computed,
                received: self.payload_crc,
            });
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("type", &self.packet_type)
            .field("data", &crate::logutil::hex_snippet(&self.data, 32))
            .field("optional", &crate::logutil::hex_snippet(&self.optional, 16))
            .finish()
    }
}

/// Total frame length from a partial buffer that starts at the sync byte.
///
/// Needs the sync byte plus the 3 length bytes; returns `None` for shorter
/// input.
pub fn length_from_header(header: &[u8]) -> Option<usize> {
    if header.len() < 4 {
        return None;
    }
    let data_len = u16::from_be_bytes([header[1], header[2]]) as usize;
    let optional_len = header[3] as usize;
    Some(FRAME_OVERHEAD + data_len + optional_len)
}

/// Convenience wrapper: `Packet::new(..)?.encode()`.
pub fn encode(
    packet_type: PacketType,
    data: &[u8],
    optional: &[u8],
) -> Result<Vec<u8>, EncodingError> {
    Ok(Packet::new(packet_type, data.to_vec(), optional.to_vec())?.encode())
}

fn header_bytes(packet_type: PacketType, data_len: usize, optional_len: usize) -> [u8; 4] {
    let len = (data_len as u16).to_be_bytes();
    [len[0], len[1], optional_len as u8, packet_type.code()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_read_version_command() {
        let bytes = encode(PacketType::CommonCommand, &[0x03], &[]).unwrap();
        assert_eq!(bytes, vec![0x55, 0x00, 0x01, 0x00, 0x05, 0x70, 0x03, 0x09]);
    }

    #[test]
    fn length_formula_holds_across_field_widths() {
        for data_len in [0usize, 1, 2, 255, 256, 4096, 65534, 65535] {
            for opt_len in [0usize, 1, 7, 128, 255] {
                let len = (data_len as u16).to_be_bytes();
                let header = [SYNC_BYTE, len[0], len[1], opt_len as u8];
                assert_eq!(
                    length_from_header(&header),
                    Some(7 + data_len + opt_len),
                    "data={data_len} opt={opt_len}"
                );
            }
        }
        assert_eq!(length_from_header(&[SYNC_BYTE, 0x00, 0x01]), None);
    }

    #[test]
    fn round_trip_preserves_sections() {
        let cases: Vec<(PacketType, Vec<u8>, Vec<u8>)> = vec![
            (PacketType::Response, vec![], vec![]),
            (PacketType::CommonCommand, vec![0x08], vec![]),
            (PacketType::Event, vec![0x02], vec![0x01]),
            (
                PacketType::Radio,
                vec![0xF6, 0x50, 0x00, 0x29, 0x89, 0x79, 0x30],
                vec![0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x37, 0x00],
            ),
            (PacketType::RadioAdvanced, vec![0xAB; MAX_DATA_LEN], vec![0xCD; MAX_OPTIONAL_LEN]),
        ];
        for (ty, data, opt) in cases {
            let wire = Packet::new(ty, data.clone(), opt.clone()).unwrap().encode();
            assert_eq!(wire.len(), 7 + data.len() + opt.len());
            let decoded = Packet::decode(&wire).unwrap();
            decoded.validate().unwrap();
            assert_eq!(decoded.packet_type(), ty);
            assert_eq!(decoded.data(), &data[..]);
            assert_eq!(decoded.optional(), &opt[..]);
        }
    }

    #[test]
    fn oversized_sections_are_rejected() {
        assert_eq!(
            Packet::new(PacketType::Radio, vec![0; MAX_DATA_LEN + 1], vec![]),
            Err(EncodingError::DataTooLong(MAX_DATA_LEN + 1))
        );
        assert_eq!(
            Packet::new(PacketType::Radio, vec![], vec![0; 256]),
            Err(EncodingError::OptionalTooLong(256))
        );
    }

    #[test]
    fn decode_keeps_corrupt_checksums_for_validation() {
        let mut wire = encode(PacketType::CommonCommand, &[0x03], &[]).unwrap();
        wire[6] ^= 0x01; // data byte
        let packet = Packet::decode(&wire).expect("still parseable");
        assert!(matches!(
            packet.validate(),
            Err(FramingError::PayloadChecksum { received: 0x09, .. })
        ));

        let mut wire = encode(PacketType::CommonCommand, &[0x03], &[]).unwrap();
        wire[5] ^= 0x80; // header crc
        let packet = Packet::decode(&wire).unwrap();
        assert!(matches!(packet.validate(), Err(FramingError::HeaderChecksum { .. })));
    }

    #[test]
    fn decode_rejects_truncated_and_unknown() {
        let wire = encode(PacketType::Radio, &[1, 2, 3], &[4]).unwrap();
        assert_eq!(
            Packet::decode(&wire[..wire.len() - 1]),
            Err(FramingError::TooShort { expected: 11, actual: 10 })
        );
        assert_eq!(
            Packet::decode(&[0x55, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00]),
            Err(FramingError::UnknownPacketType(0x08))
        );
        assert_eq!(
            Packet::decode(&[0x54, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00]),
            Err(FramingError::MissingSync(0x54))
        );
    }

    #[test]
    fn radio_command_layout() {
        let dest = Address::from_u32(0x0180_2A3B);
        let packet = Packet::radio(0xF6, &[0x30], dest).unwrap();
        assert_eq!(packet.packet_type(), PacketType::Radio);
        assert_eq!(packet.data(), &[0xF6, 0x30, 0x00, 0xFF, 0xFF, 0xFF, 0x00]);
        assert_eq!(packet.optional(), &[0x03, 0x01, 0x80, 0x2A, 0x3B, 0xFF, 0x00]);
        assert!(packet.is_valid());
    }
}
