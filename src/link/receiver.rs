//! Frame receiver: byte stream in, classified packets out.

use std::sync::Arc;

use log::{debug, trace, warn};

use super::gate::ResponseGate;
use super::queue::{LinkQueues, Priority};
use crate::esp3::command::needs_response;
use crate::esp3::{FrameAssembler, Packet, PacketType};
use crate::metrics::LinkStats;

/// Receive queue a validated packet belongs in.
pub fn classify(packet: &Packet) -> Priority {
    if needs_response(packet) {
        Priority::High
    } else {
        Priority::Low
    }
}

pub struct FrameReceiver {
    assembler: FrameAssembler,
    queues: Arc<LinkQueues>,
    gate: Arc<ResponseGate>,
    stats: Arc<LinkStats>,
}

impl FrameReceiver {
    pub fn new(queues: Arc<LinkQueues>, gate: Arc<ResponseGate>, stats: Arc<LinkStats>) -> Self {
        Self {
            assembler: FrameAssembler::new(),
            queues,
            gate,
            stats,
        }
    }

    /// Feed bytes as they arrive. Returns how many packets were queued.
    pub fn on_bytes(&mut self, bytes: &[u8]) -> usize {
        let mut queued = 0;
        for result in self.assembler.push(bytes) {
            match result {
                Ok(packet) => {
                    self.accept(packet);
                    queued += 1;
                }
                Err(e) => {
                    self.stats.inc_frames_dropped();
                    warn!(
                        "Dropping malformed frame: {} (pending {} bytes)",
                        e,
                        self.assembler.buffered_len()
                    );
                }
            }
        }
        queued
    }

    fn accept(&self, packet: Packet) {
        self.stats.inc_frames_received();
        trace!("RX {:?}", packet);

        if packet.packet_type() == PacketType::Response {
            self.stats.inc_responses_received();
            if !self.gate.release() {
                debug!("RESPONSE with no exchange outstanding");
            }
        }

        let priority = classify(&packet);
        debug!(
            "Queueing received {:?} ({} data bytes) as {:?}",
            packet.packet_type(),
            packet.data().len(),
            priority
        );
        self.queues.rx(priority).push(packet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receiver() -> (FrameReceiver, Arc<LinkQueues>, Arc<ResponseGate>, Arc<LinkStats>) {
        let queues = Arc::new(LinkQueues::new());
        let gate = Arc::new(ResponseGate::new());
        let stats = Arc::new(LinkStats::new());
        (
            FrameReceiver::new(queues.clone(), gate.clone(), stats.clone()),
            queues,
            gate,
            stats,
        )
    }

    fn frame(packet_type: PacketType, data: &[u8]) -> Vec<u8> {
        Packet::new(packet_type, data.to_vec(), vec![]).unwrap().encode()
    }

    #[test]
    fn response_releases_gate_and_goes_low() {
        let (mut rx, queues, gate, stats) = receiver();
        assert!(gate.try_acquire());
        assert_eq!(rx.on_bytes(&frame(PacketType::Response, &[0x00])), 1);
        assert!(!gate.is_held());
        assert_eq!(queues.rx_low.len(), 1);
        assert_eq!(stats.snapshot().responses_received, 1);
    }

    #[test]
    fn smart_ack_events_go_high_others_low() {
        let (mut rx, queues, _, _) = receiver();
        let mut bytes = frame(PacketType::Event, &[0x02, 0x00]);
        bytes.extend(frame(PacketType::Event, &[0x04]));
        bytes.extend(frame(PacketType::Radio, &[0xF6, 0x30, 1, 2, 3, 4, 0x30]));
        assert_eq!(rx.on_bytes(&bytes), 3);
        assert_eq!(queues.rx_high.len(), 1);
        assert_eq!(queues.rx_low.len(), 2);
    }

    #[test]
    fn corrupt_frame_is_counted_and_next_survives() {
        let (mut rx, queues, _, stats) = receiver();
        let mut bad = frame(PacketType::Radio, &[0xD5, 0x09, 1, 2, 3, 4, 0]);
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        bad.extend(frame(PacketType::Response, &[0x00]));
        assert_eq!(rx.on_bytes(&bad), 1);
        let snap = stats.snapshot();
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.frames_received, 1);
        assert_eq!(
            queues.rx_low.pop().map(|p| p.packet_type()),
            Some(PacketType::Response)
        );
    }

    #[test]
    fn bytes_split_across_calls() {
        let (mut rx, queues, _, _) = receiver();
        let bytes = frame(PacketType::CommonCommand, &[0x03]);
        let (a, b) = bytes.split_at(3);
        assert_eq!(rx.on_bytes(a), 0);
        assert_eq!(rx.on_bytes(b), 1);
        assert_eq!(queues.rx_low.len(), 1);
    }
}
