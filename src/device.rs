//! Device identity, equipment profile identifiers and the registry seam.
//!
//! The stack never owns devices. It looks them up and asks the application's
//! [`DeviceRegistry`] to create one when a teach-in succeeds. [`DeviceTable`]
//! is an in-memory registry good enough for tools and tests; applications with
//! persistence plug in their own implementation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Manufacturer id used when a telegram does not carry one.
pub const MANUFACTURER_UNKNOWN: u16 = 0x7FF;

/// 4-byte EnOcean radio address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 4]);

impl Address {
    pub const BROADCAST: Address = Address([0xFF; 4]);

    pub const fn new(bytes: [u8; 4]) -> Self {
        Address(bytes)
    }

    pub const fn from_u32(value: u32) -> Self {
        Address(value.to_be_bytes())
    }

    /// Read 4 big-endian bytes; `None` when the slice is shorter.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(Address(raw))
    }

    pub const fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.as_u32())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

/// Equipment profile identifier: RORG, FUNC and TYPE.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EepId {
    pub rorg: u8,
    pub func: u8,
    pub type_: u8,
}

impl EepId {
    pub const fn new(rorg: u8, func: u8, type_: u8) -> Self {
        EepId { rorg, func, type_ }
    }
}

impl fmt::Display for EepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}-{:02X}-{:02X}", self.rorg, self.func, self.type_)
    }
}

impl fmt::Debug for EepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EepId({})", self)
    }
}

impl FromStr for EepId {
    type Err = String;

    /// Parses `A5-02-05` (also accepts `:` or `_` separators, any case).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s
            .trim()
            .split(|c| c == '-' || c == ':' || c == '_')
            .collect();
        if parts.len() != 3 {
            return Err(format!("invalid EEP '{}': expected RR-FF-TT", s));
        }
        let mut out = [0u8; 3];
        for (slot, part) in out.iter_mut().zip(&parts) {
            *slot = u8::from_str_radix(part, 16)
                .map_err(|e| format!("invalid EEP '{}': {}", s, e))?;
        }
        Ok(EepId::new(out[0], out[1], out[2]))
    }
}

impl Serialize for EepId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EepId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Entry in the table of profiles known to this stack.
#[derive(Debug, Clone, Copy)]
pub struct ProfileEntry {
    pub eep: EepId,
    pub description: &'static str,
}

/// RPS teach-in carries no profile; two-rocker switches resolve to this one.
pub const RPS_DEFAULT_PROFILE: EepId = EepId::new(0xF6, 0x02, 0x01);
/// The only 1BS profile (single input contact).
pub const ONE_BS_PROFILE: EepId = EepId::new(0xD5, 0x00, 0x01);

pub const KNOWN_PROFILES: &[ProfileEntry] = &[
    ProfileEntry { eep: EepId::new(0xF6, 0x02, 0x01), description: "Light and blind control, application style 1" },
    ProfileEntry { eep: EepId::new(0xF6, 0x02, 0x02), description: "Light and blind control, application style 2" },
    ProfileEntry { eep: EepId::new(0xF6, 0x10, 0x00), description: "Window handle" },
    ProfileEntry { eep: EepId::new(0xD5, 0x00, 0x01), description: "Single input contact" },
    ProfileEntry { eep: EepId::new(0xA5, 0x02, 0x05), description: "Temperature sensor 0..40 C" },
    ProfileEntry { eep: EepId::new(0xA5, 0x04, 0x01), description: "Temperature and humidity sensor 0..40 C" },
    ProfileEntry { eep: EepId::new(0xA5, 0x06, 0x01), description: "Light sensor 300..60000 lx" },
    ProfileEntry { eep: EepId::new(0xA5, 0x07, 0x01), description: "Occupancy sensor with supply voltage" },
    ProfileEntry { eep: EepId::new(0xA5, 0x09, 0x04), description: "CO2 sensor with humidity and temperature" },
    ProfileEntry { eep: EepId::new(0xA5, 0x10, 0x06), description: "Room operating panel, set point and day/night" },
    ProfileEntry { eep: EepId::new(0xA5, 0x12, 0x01), description: "Automated meter reading, electricity" },
    ProfileEntry { eep: EepId::new(0xA5, 0x20, 0x01), description: "Battery powered actuator (HVAC)" },
    ProfileEntry { eep: EepId::new(0xD2, 0x01, 0x01), description: "Electronic switch, 1 channel" },
    ProfileEntry { eep: EepId::new(0xD2, 0x01, 0x12), description: "Electronic switch, 2 channels" },
    ProfileEntry { eep: EepId::new(0xD2, 0x05, 0x00), description: "Blinds control for position and angle" },
];

/// Look up the table entry for `eep`.
pub fn known_profile(eep: EepId) -> Option<&'static ProfileEntry> {
    KNOWN_PROFILES.iter().find(|p| p.eep == eep)
}

/// A paired device as seen by this stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub address: Address,
    pub manufacturer: u16,
    pub eep: EepId,
}

/// Application-side device registry.
pub trait DeviceRegistry: Send + Sync {
    fn lookup(&self, address: Address) -> Option<Device>;

    fn is_profile_supported(&self, eep: EepId) -> bool;

    fn create(&self, address: Address, manufacturer: u16, eep: EepId) -> Result<Device, DeviceError>;
}

/// In-memory [`DeviceRegistry`].
pub struct DeviceTable {
    devices: Mutex<HashMap<u32, Device>>,
    profiles: Vec<EepId>,
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTable {
    /// Registry supporting every profile in [`KNOWN_PROFILES`].
    pub fn new() -> Self {
        Self::with_profiles(KNOWN_PROFILES.iter().map(|p| p.eep).collect())
    }

    pub fn with_profiles(profiles: Vec<EepId>) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            profiles,
        }
    }

    /// Register a device without going through teach-in.
    pub fn insert(&self, device: Device) {
        if let Ok(mut guard) = self.devices.lock() {
            guard.insert(device.address.as_u32(), device);
        }
    }

    pub fn remove(&self, address: Address) -> Option<Device> {
        self.devices.lock().ok()?.remove(&address.as_u32())
    }

    pub fn len(&self) -> usize {
        self.devices.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn devices(&self) -> Vec<Device> {
        self.devices
            .lock()
            .map(|g| g.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl DeviceRegistry for DeviceTable {
    fn lookup(&self, address: Address) -> Option<Device> {
        self.devices.lock().ok()?.get(&address.as_u32()).cloned()
    }

    fn is_profile_supported(&self, eep: EepId) -> bool {
        self.profiles.contains(&eep)
    }

    fn create(&self, address: Address, manufacturer: u16, eep: EepId) -> Result<Device, DeviceError> {
        if !self.is_profile_supported(eep) {
            debug!("Refusing {} for {}: profile not supported", eep, address);
            return Err(DeviceError::UnsupportedProfile(eep));
        }
        let mut guard = self
            .devices
            .lock()
            .map_err(|_| DeviceError::Rejected("device table poisoned".to_string()))?;
        if guard.contains_key(&address.as_u32()) {
            return Err(DeviceError::AlreadyRegistered(address));
        }
        let device = Device {
            address,
            manufacturer,
            eep,
        };
        guard.insert(address.as_u32(), device.clone());
        info!("Registered device {} ({}, manufacturer 0x{:03X})", address, eep, manufacturer);
        Ok(device)
    }
}
