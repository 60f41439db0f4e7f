//! RESPONSE / EVENT payload codes and COMMON_COMMAND builders.

use std::fmt;

use serde::Serialize;

use super::packet::{Packet, PacketType};
use crate::device::Address;
use crate::error::EncodingError;

/// First data byte of a RESPONSE packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Ok,
    Error,
    NotSupported,
    WrongParam,
    OperationDenied,
    LockSet,
    BufferTooSmall,
    NoFreeBuffer,
    Other(u8),
}

impl From<u8> for ReturnCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ReturnCode::Ok,
            0x01 => ReturnCode::Error,
            0x02 => ReturnCode::NotSupported,
            0x03 => ReturnCode::WrongParam,
            0x04 => ReturnCode::OperationDenied,
            0x05 => ReturnCode::LockSet,
            0x06 => ReturnCode::BufferTooSmall,
            0x07 => ReturnCode::NoFreeBuffer,
            other => ReturnCode::Other(other),
        }
    }
}

impl ReturnCode {
    /// Return code of a RESPONSE packet; `None` for other packet types or an
    /// empty data section.
    pub fn of(packet: &Packet) -> Option<Self> {
        if packet.packet_type() != PacketType::Response {
            return None;
        }
        packet.data().first().map(|&b| ReturnCode::from(b))
    }

    pub fn is_ok(self) -> bool {
        self == ReturnCode::Ok
    }
}

/// First data byte of an EVENT packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCode {
    SaReclaimNotSuccessful,
    SaConfirmLearn,
    SaLearnAck,
    CoReady,
    CoEventSecureDevices,
    CoDutyCycleLimit,
    CoTransmitFailed,
    Other(u8),
}

impl From<u8> for EventCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => EventCode::SaReclaimNotSuccessful,
            0x02 => EventCode::SaConfirmLearn,
            0x03 => EventCode::SaLearnAck,
            0x04 => EventCode::CoReady,
            0x05 => EventCode::CoEventSecureDevices,
            0x06 => EventCode::CoDutyCycleLimit,
            0x07 => EventCode::CoTransmitFailed,
            other => EventCode::Other(other),
        }
    }
}

impl EventCode {
    pub fn of(packet: &Packet) -> Option<Self> {
        if packet.packet_type() != PacketType::Event {
            return None;
        }
        packet.data().first().map(|&b| EventCode::from(b))
    }

    /// Smart-ack events the host has to answer.
    pub fn needs_response(self) -> bool {
        matches!(
            self,
            EventCode::SaReclaimNotSuccessful | EventCode::SaConfirmLearn | EventCode::SaLearnAck
        )
    }
}

/// Whether `packet` is an EVENT that must be answered promptly.
pub fn needs_response(packet: &Packet) -> bool {
    EventCode::of(packet).is_some_and(EventCode::needs_response)
}

/// COMMON_COMMAND codes used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommonCommand {
    WriteReset = 0x02,
    ReadVersion = 0x03,
    ReadIdBase = 0x08,
}

impl CommonCommand {
    pub fn packet(self) -> Result<Packet, EncodingError> {
        Packet::new(PacketType::CommonCommand, vec![self as u8], Vec::new())
    }
}

/// Parsed response to [`CommonCommand::ReadVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub app_version: [u8; 4],
    pub api_version: [u8; 4],
    pub chip_id: Address,
    pub chip_version: u32,
    pub description: String,
}

impl VersionInfo {
    /// Layout: return code, app version (4), API version (4), chip id (4),
    /// chip version (4), app description (16, NUL padded ASCII).
    pub fn parse(packet: &Packet) -> Option<Self> {
        if !ReturnCode::of(packet)?.is_ok() {
            return None;
        }
        let d = packet.data();
        if d.len() < 17 {
            return None;
        }
        let quad = |at: usize| [d[at], d[at + 1], d[at + 2], d[at + 3]];
        let description = d
            .get(17..33)
            .map(|raw| {
                raw.iter()
                    .take_while(|&&b| b != 0)
                    .map(|&b| b as char)
                    .collect::<String>()
            })
            .unwrap_or_default();
        Some(VersionInfo {
            app_version: quad(1),
            api_version: quad(5),
            chip_id: Address::new(quad(9)),
            chip_version: u32::from_be_bytes(quad(13)),
            description,
        })
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = |q: &[u8; 4]| format!("{}.{}.{}.{}", q[0], q[1], q[2], q[3]);
        write!(
            f,
            "app {} api {} chip {} ({})",
            v(&self.app_version),
            v(&self.api_version),
            self.chip_id,
            self.description
        )
    }
}

/// Base id returned by [`CommonCommand::ReadIdBase`].
pub fn parse_id_base(packet: &Packet) -> Option<Address> {
    if !ReturnCode::of(packet)?.is_ok() {
        return None;
    }
    Address::from_slice(packet.data().get(1..)?)
}
