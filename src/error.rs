use thiserror::Error;

use crate::device::{Address, EepId};
use crate::esp3::PacketType;

/// Errors raised while turning wire bytes into a [`crate::esp3::Packet`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Buffer ends before the declared frame length.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// First byte is not the ESP3 sync marker.
    #[error("missing sync byte (found 0x{0:02X})")]
    MissingSync(u8),

    /// Type byte outside the ESP3 packet type table.
    #[error("unknown packet type 0x{0:02X}")]
    UnknownPacketType(u8),

    /// Header checksum does not match the 4 header bytes.
    #[error("header checksum mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    HeaderChecksum { computed: u8, received: u8 },

    /// Payload checksum does not match data and optional data.
    #[error("payload checksum mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    PayloadChecksum { computed: u8, received: u8 },
}

/// Errors raised while building an outgoing packet.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// Data section longer than the 2-byte length field allows.
    #[error("data section too long: {0} bytes (max 65535)")]
    DataTooLong(usize),

    /// Optional data longer than the 1-byte length field allows.
    #[error("optional data too long: {0} bytes (max 255)")]
    OptionalTooLong(usize),
}

/// Errors raised when a packet cannot be viewed as a radio telegram.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelegramError {
    #[error("packet type {0:?} does not carry a radio telegram")]
    NotRadio(PacketType),

    #[error("radio telegram too short for RORG 0x{rorg:02X}: need {needed} bytes, got {actual}")]
    TooShort { rorg: u8, needed: usize, actual: usize },

    #[error("empty radio telegram")]
    Empty,

    #[error("unsupported RORG 0x{0:02X}")]
    UnsupportedRorg(u8),
}

/// Errors reported by a [`crate::device::DeviceRegistry`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("profile {0} is not supported")]
    UnsupportedProfile(EepId),

    #[error("device {0} is already registered")]
    AlreadyRegistered(Address),

    #[error("registry rejected device: {0}")]
    Rejected(String),
}
