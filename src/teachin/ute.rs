//! Universal Teach-in (UTE) query parsing and response building.
//!
//! A UTE query carries seven data bytes, DB6 first:
//!
//! | byte | content |
//! |------|---------|
//! | DB6  | bit 7 bidirectional, bit 6 response required, bits 5..4 request type, bits 3..0 command |
//! | DB5  | number of channels (0xFF = all) |
//! | DB4  | manufacturer id, low 8 bits |
//! | DB3  | manufacturer id, high 3 bits (bits 2..0) |
//! | DB2  | TYPE |
//! | DB1  | FUNC |
//! | DB0  | RORG |
//!
//! The response echoes DB5..DB0 behind its own DB6 code.

use crate::device::{Address, EepId};
use crate::error::{EncodingError, TelegramError};
use crate::esp3::{Packet, Rorg, Telegram};

pub const UTE_DATA_LEN: usize = 7;

const BIDIRECTIONAL: u8 = 0x80;
const RESPONSE_REQUIRED: u8 = 0x40;
const COMMAND_QUERY: u8 = 0x0;

/// Request type, DB6 bits 5..4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UteRequest {
    TeachIn,
    Deletion,
    Unspecified,
    NotUsed,
}

impl From<u8> for UteRequest {
    fn from(db6: u8) -> Self {
        match (db6 >> 4) & 0x03 {
            0b00 => UteRequest::TeachIn,
            0b01 => UteRequest::Deletion,
            0b10 => UteRequest::Unspecified,
            _ => UteRequest::NotUsed,
        }
    }
}

/// DB6 of a UTE response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UteResponseCode {
    Success = 0x91,
    Refused = 0xB1,
    DeletionAccepted = 0xA1,
}

impl UteResponseCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UteQuery {
    pub bidirectional: bool,
    pub response_required: bool,
    pub request: UteRequest,
    /// 0 = query, 1 = response.
    pub command: u8,
    pub channels: u8,
    pub manufacturer: u16,
    pub eep: EepId,
}

impl UteQuery {
    pub fn parse(data: &[u8]) -> Result<Self, TelegramError> {
        if data.len() < UTE_DATA_LEN {
            return Err(TelegramError::TooShort {
                rorg: Rorg::Ute.code(),
                needed: UTE_DATA_LEN,
                actual: data.len(),
            });
        }
        let db6 = data[0];
        Ok(UteQuery {
            bidirectional: db6 & BIDIRECTIONAL != 0,
            response_required: db6 & RESPONSE_REQUIRED != 0,
            request: UteRequest::from(db6),
            command: db6 & 0x0F,
            channels: data[1],
            manufacturer: u16::from(data[2]) | (u16::from(data[3] & 0x07) << 8),
            eep: EepId::new(data[6], data[5], data[4]),
        })
    }

    pub fn from_telegram(telegram: &Telegram<'_>) -> Result<Self, TelegramError> {
        if telegram.rorg() != Rorg::Ute {
            return Err(TelegramError::UnsupportedRorg(telegram.rorg().code()));
        }
        Self::parse(telegram.payload())
    }

    pub fn is_query(&self) -> bool {
        self.command == COMMAND_QUERY
    }

    /// Response data bytes DB6..DB0 for this query.
    pub fn response_data(&self, code: UteResponseCode) -> [u8; UTE_DATA_LEN] {
        [
            code.code(),
            self.channels,
            (self.manufacturer & 0xFF) as u8,
            ((self.manufacturer >> 8) & 0x07) as u8,
            self.eep.type_,
            self.eep.func,
            self.eep.rorg,
        ]
    }
}

/// UTE response radio packet addressed to the requesting device.
pub fn build_response(
    query: &UteQuery,
    code: UteResponseCode,
    destination: Address,
) -> Result<Packet, EncodingError> {
    Packet::radio(Rorg::Ute.code(), &query.response_data(code), destination)
}
