//! Radio telegram views over RADIO (ERP1) packets.
//!
//! ERP1 data layout is `RORG ‖ payload ‖ sender id (4) ‖ status (1)`; the
//! optional data, when present, is `sub-telegrams ‖ destination (4) ‖ dBm ‖
//! security level`. A [`Telegram`] borrows from its packet; nothing is copied.

use crate::device::Address;
use crate::error::TelegramError;

use super::packet::{Packet, PacketType};

/// Sender id + status trailing every ERP1 payload.
const TRAILER_LEN: usize = 5;

/// Radio organization byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Rorg {
    Rps = 0xF6,
    OneBs = 0xD5,
    FourBs = 0xA5,
    Vld = 0xD2,
    Msc = 0xD1,
    Ute = 0xD4,
}

impl Rorg {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Rorg {
    type Error = TelegramError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0xF6 => Rorg::Rps,
            0xD5 => Rorg::OneBs,
            0xA5 => Rorg::FourBs,
            0xD2 => Rorg::Vld,
            0xD1 => Rorg::Msc,
            0xD4 => Rorg::Ute,
            other => return Err(TelegramError::UnsupportedRorg(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramKind {
    Rps,
    OneByte,
    FourByte,
    VariableLength,
    UteTeachIn,
    FourBsTeachIn,
}

/// Borrowed view of a radio telegram.
#[derive(Debug, Clone, Copy)]
pub struct Telegram<'a> {
    kind: TelegramKind,
    rorg: Rorg,
    data: &'a [u8],
    optional: &'a [u8],
}

impl<'a> Telegram<'a> {
    pub fn parse(packet: &'a Packet) -> Result<Self, TelegramError> {
        if packet.packet_type() != PacketType::Radio {
            return Err(TelegramError::NotRadio(packet.packet_type()));
        }
        let data = packet.data();
        let first = *data.first().ok_or(TelegramError::Empty)?;
        let rorg = Rorg::try_from(first)?;

        let min_payload = match rorg {
            Rorg::Rps | Rorg::OneBs | Rorg::Vld | Rorg::Msc => 1,
            Rorg::FourBs => 4,
            Rorg::Ute => 7,
        };
        if data.len() < 1 + min_payload + TRAILER_LEN {
            return Err(TelegramError::TooShort {
                rorg: first,
                needed: 1 + min_payload + TRAILER_LEN,
                actual: data.len(),
            });
        }
        let payload = &data[1..data.len() - TRAILER_LEN];
        let kind = match rorg {
            Rorg::Rps => TelegramKind::Rps,
            Rorg::OneBs => TelegramKind::OneByte,
            Rorg::FourBs if payload[3] & LRN_BIT == 0 => TelegramKind::FourBsTeachIn,
            Rorg::FourBs => TelegramKind::FourByte,
            Rorg::Ute => TelegramKind::UteTeachIn,
            Rorg::Vld | Rorg::Msc => TelegramKind::VariableLength,
        };

        Ok(Telegram {
            kind,
            rorg,
            data,
            optional: packet.optional(),
        })
    }

    pub fn kind(&self) -> TelegramKind {
        self.kind
    }

    pub fn rorg(&self) -> Rorg {
        self.rorg
    }

    /// User data between RORG and sender id.
    pub fn payload(&self) -> &'a [u8] {
        &self.data[1..self.data.len() - TRAILER_LEN]
    }

    pub fn sender(&self) -> Address {
        let at = self.data.len() - TRAILER_LEN;
        Address::new([
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ])
    }

    pub fn status(&self) -> u8 {
        self.data[self.data.len() - 1]
    }

    /// Repeater count from the status byte (low nibble).
    pub fn repeater_count(&self) -> u8 {
        self.status() & 0x0F
    }

    pub fn sub_telegrams(&self) -> Option<u8> {
        self.optional.first().copied()
    }

    pub fn destination(&self) -> Option<Address> {
        Address::from_slice(self.optional.get(1..)?)
    }

    /// Received signal strength as a positive dBm magnitude (e.g. 55 = -55 dBm).
    pub fn dbm(&self) -> Option<u8> {
        self.optional.get(5).copied()
    }

    pub fn security_level(&self) -> Option<u8> {
        self.optional.get(6).copied()
    }

    /// Whether this telegram asks to be taught in.
    ///
    /// RPS has no learn bit, so every RPS telegram qualifies; 1BS and 4BS use
    /// bit 3 of their last data byte (0 = teach-in); UTE always does.
    pub fn is_teach_in(&self) -> bool {
        match self.kind {
            TelegramKind::Rps | TelegramKind::UteTeachIn | TelegramKind::FourBsTeachIn => true,
            TelegramKind::OneByte => self.payload()[0] & LRN_BIT == 0,
            TelegramKind::FourByte | TelegramKind::VariableLength => false,
        }
    }
}

/// Learn bit (DB0.3) of 1BS and 4BS telegrams; clear means teach-in.
pub const LRN_BIT: u8 = 0x08;

#[cfg(test)]
mod tests {
    use super::*;

    fn radio(data: &[u8], optional: &[u8]) -> Packet {
        Packet::new(PacketType::Radio, data.to_vec(), optional.to_vec()).unwrap()
    }

    #[test]
    fn rps_view_exposes_fields() {
        let packet = radio(
            &[0xF6, 0x50, 0x00, 0x29, 0x89, 0x79, 0x30],
            &[0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x37, 0x00],
        );
        let t = Telegram::parse(&packet).unwrap();
        assert_eq!(t.kind(), TelegramKind::Rps);
        assert_eq!(t.rorg(), Rorg::Rps);
        assert_eq!(t.payload(), &[0x50]);
        assert_eq!(t.sender(), Address::from_u32(0x0029_8979));
        assert_eq!(t.status(), 0x30);
        assert_eq!(t.repeater_count(), 0);
        assert_eq!(t.sub_telegrams(), Some(1));
        assert_eq!(t.destination(), Some(Address::BROADCAST));
        assert_eq!(t.dbm(), Some(0x37));
        assert_eq!(t.security_level(), Some(0));
        assert!(t.is_teach_in());
    }

    #[test]
    fn four_bs_learn_bit_selects_kind() {
        let teach = radio(&[0xA5, 0x08, 0x28, 0x46, 0x80, 1, 2, 3, 4, 0x00], &[]);
        let data = radio(&[0xA5, 0x00, 0x00, 0x7F, 0x08, 1, 2, 3, 4, 0x00], &[]);
        assert_eq!(Telegram::parse(&teach).unwrap().kind(), TelegramKind::FourBsTeachIn);
        let t = Telegram::parse(&data).unwrap();
        assert_eq!(t.kind(), TelegramKind::FourByte);
        assert!(!t.is_teach_in());
        assert_eq!(t.destination(), None);
    }

    #[test]
    fn one_bs_learn_bit() {
        let teach = radio(&[0xD5, 0x00, 1, 2, 3, 4, 0x00], &[]);
        let normal = radio(&[0xD5, 0x09, 1, 2, 3, 4, 0x00], &[]);
        assert!(Telegram::parse(&teach).unwrap().is_teach_in());
        assert!(!Telegram::parse(&normal).unwrap().is_teach_in());
    }

    #[test]
    fn rejects_non_radio_short_and_unknown() {
        let response = Packet::new(PacketType::Response, vec![0x00], vec![]).unwrap();
        assert_eq!(
            Telegram::parse(&response).unwrap_err(),
            TelegramError::NotRadio(PacketType::Response)
        );
        let short = radio(&[0xA5, 0x00, 0x00, 1, 2, 3, 4, 0x00], &[]);
        assert!(matches!(
            Telegram::parse(&short).unwrap_err(),
            TelegramError::TooShort { rorg: 0xA5, needed: 10, actual: 8 }
        ));
        let unknown = radio(&[0x30, 0x00, 1, 2, 3, 4, 0x00], &[]);
        assert_eq!(Telegram::parse(&unknown).unwrap_err(), TelegramError::UnsupportedRorg(0x30));
        let empty = radio(&[], &[]);
        assert_eq!(Telegram::parse(&empty).unwrap_err(), TelegramError::Empty);
    }

    #[test]
    fn vld_payload_is_variable() {
        let packet = radio(&[0xD2, 0x01, 0x00, 0x64, 0x05, 0x06, 0x07, 0x08, 0x00], &[]);
        let t = Telegram::parse(&packet).unwrap();
        assert_eq!(t.kind(), TelegramKind::VariableLength);
        assert_eq!(t.payload(), &[0x01, 0x00, 0x64]);
    }
}
