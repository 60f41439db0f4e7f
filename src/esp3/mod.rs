//! # ESP3 Serial Protocol
//!
//! Wire-level building blocks for talking to an EnOcean transceiver:
//!
//! - [`crc`] - CRC-8 used for the header and payload checksums
//! - [`packet`] - the [`Packet`] model, encode/decode and length helpers
//! - [`assembler`] - incremental byte-stream → packet framer with resync
//! - [`telegram`] - borrowed radio telegram views (RPS, 1BS, 4BS, VLD, UTE)
//! - [`command`] - RESPONSE/EVENT codes and COMMON_COMMAND builders
//!
//! ```rust
//! use enocean_link::esp3::{Packet, PacketType};
//!
//! let packet = Packet::new(PacketType::CommonCommand, vec![0x03], vec![]).unwrap();
//! assert_eq!(packet.encode(), vec![0x55, 0x00, 0x01, 0x00, 0x05, 0x70, 0x03, 0x09]);
//! ```

pub mod assembler;
pub mod command;
pub mod crc;
pub mod packet;
pub mod telegram;

pub use assembler::FrameAssembler;
pub use command::{CommonCommand, EventCode, ReturnCode, VersionInfo};
pub use packet::{length_from_header, Packet, PacketType, SYNC_BYTE};
pub use telegram::{Rorg, Telegram, TelegramKind};
