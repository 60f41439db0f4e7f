//! # enocean-link - host-side ESP3 stack for EnOcean transceivers
//!
//! Talks to an EnOcean USB/UART gateway over its ESP3 serial protocol:
//! frames and validates packets, multiplexes outgoing commands against the
//! asynchronous radio traffic coming back, and runs the teach-in (pairing)
//! protocol for RPS, 1BS, 4BS and UTE devices.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use enocean_link::device::DeviceTable;
//! use enocean_link::link::{Link, LinkTuning};
//! use enocean_link::teachin::TeachInEngine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let link = Link::open_serial("/dev/ttyUSB0", 57600, LinkTuning::default()).await?;
//!     let registry = Arc::new(DeviceTable::new());
//!     let teach_in = Arc::new(TeachInEngine::new(registry, link.sender()));
//!     link.add_listener(teach_in.clone());
//!     teach_in.enable(Duration::from_secs(60));
//!
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//!     link.shutdown().await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`esp3`] - packet codec, CRC-8, frame assembler, telegram views, command codes
//! - [`link`] - priority queues, response gate, transmit engine, delivery loop, transports
//! - [`teachin`] - teach-in state machine and UTE handling
//! - [`device`] - addresses, profile identifiers and the device registry
//! - [`config`] - TOML configuration
//! - [`metrics`] - per-link counters
//!
//! ## Architecture
//!
//! ```text
//! serial bytes ─► FrameReceiver ─► RX high/low ─► DeliveryLoop ─► FrameListener(s)
//!                      │                                             │
//!                 ResponseGate                                 TeachInEngine
//!                      │                                             │
//! serial sink ◄── TransmitEngine ◄──────── TX high/low ◄─────────────┘
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod esp3;
pub mod link;
pub mod logutil;
pub mod metrics;
pub mod teachin;
