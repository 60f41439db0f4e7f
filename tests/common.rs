//! Test utilities & fixtures: packet builders and recording listeners.
#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use enocean_link::device::{Address, Device};
use enocean_link::esp3::{Packet, PacketType};
use enocean_link::teachin::TeachInListener;

/// Link tuning fast enough for wall-clock tests.
pub fn fast_tuning() -> enocean_link::link::LinkTuning {
    enocean_link::link::LinkTuning {
        response_timeout: Duration::from_millis(60),
        tx_cycle: Duration::from_millis(5),
        delivery_cycle: Duration::from_millis(5),
        ..Default::default()
    }
}

pub fn command(code: u8) -> Packet {
    Packet::new(PacketType::CommonCommand, vec![code], vec![]).unwrap()
}

pub fn response_ok() -> Packet {
    Packet::new(PacketType::Response, vec![0x00], vec![]).unwrap()
}

/// Received ERP1 telegram: `rorg ‖ payload ‖ sender ‖ status`.
pub fn radio_from(sender: Address, rorg: u8, payload: &[u8]) -> Packet {
    let mut data = vec![rorg];
    data.extend_from_slice(payload);
    data.extend_from_slice(&sender.to_bytes());
    data.push(0x00);
    let optional = vec![0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x4A, 0x00];
    Packet::new(PacketType::Radio, data, optional).unwrap()
}

/// UTE teach-in query for `rorg-func-type`, response required.
pub fn ute_query(sender: Address, db6: u8, rorg: u8, func: u8, type_: u8) -> Packet {
    radio_from(sender, 0xD4, &[db6, 0x01, 0x46, 0x00, type_, func, rorg])
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started,
    Ended,
    Found(Device),
    Registered(Device),
}

#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl TeachInListener for EventLog {
    fn on_teach_in_started(&self) {
        self.push(Event::Started);
    }

    fn on_teach_in_ended(&self) {
        self.push(Event::Ended);
    }

    fn on_device_found(&self, device: &Device) {
        self.push(Event::Found(device.clone()));
    }

    fn on_registered_device_found(&self, device: &Device, _packet: &Packet) {
        self.push(Event::Registered(device.clone()));
    }
}
