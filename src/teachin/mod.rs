//! # Teach-in
//!
//! Pairs unknown radio devices with the [`DeviceRegistry`](crate::device::DeviceRegistry).
//!
//! The engine is Disabled until [`TeachInEngine::enable`] opens a window
//! with a deadline. While open, a telegram from an unknown sender is handled
//! by sub-protocol:
//!
//! - **UTE**: answered with SUCCESS, REFUSED or DELETION_ACCEPTED
//! - **RPS**: learned as F6-02-01
//! - **1BS** with the learn bit cleared: learned as D5-00-01
//! - **4BS** with the learn bit cleared: learned with the profile it carries
//!
//! Telegrams from known senders bypass all of this and are reported through
//! [`TeachInListener::on_registered_device_found`]. The window closes on
//! [`TeachInEngine::disable`] or when a delivery tick finds the deadline
//! passed.

mod engine;
pub mod ute;

use std::time::Instant;

pub use engine::{carried_profile, TeachInEngine, TeachInOutcome, MAX_TEACH_IN_WINDOW};
pub use ute::{UteQuery, UteRequest, UteResponseCode};

use crate::device::{Address, Device, EepId};
use crate::esp3::Packet;

/// Notifications from the teach-in engine. All methods default to no-ops.
pub trait TeachInListener: Send + Sync {
    fn on_teach_in_started(&self) {}

    fn on_teach_in_ended(&self) {}

    /// A new device was created in the registry.
    fn on_device_found(&self, _device: &Device) {}

    /// A telegram arrived from a device the registry already knows.
    fn on_registered_device_found(&self, _device: &Device, _packet: &Packet) {}
}

/// Device a targeted teach-in window is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeachInTarget {
    pub address: Address,
    pub eep: EepId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeachInState {
    pub deadline: Option<Instant>,
    pub target: Option<TeachInTarget>,
}

impl TeachInState {
    pub fn is_enabled(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left in the window at `now`.
    pub fn remaining(&self, now: Instant) -> Option<std::time::Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }
}
