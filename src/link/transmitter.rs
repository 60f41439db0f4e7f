//! Transmit engine.
//!
//! Each cycle does at most one write. TX-high always goes first and never
//! waits for a RESPONSE. TX-low is single-flight: a packet is only sent while
//! it holds the [`ResponseGate`] permit, and it stays outstanding until the
//! receiver releases the permit or the attempt budget runs out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use super::gate::ResponseGate;
use super::queue::{LinkQueues, QueueItem};
use super::transport::ByteSink;
use super::ControlMessage;
use crate::esp3::Packet;
use crate::logutil::hex_snippet;
use crate::metrics::LinkStats;

/// How long a low-priority packet waits for its RESPONSE before a resend.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);
/// Pause between transmit cycles.
pub const TX_CYCLE: Duration = Duration::from_millis(20);

/// What a single [`TransmitEngine::cycle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Idle,
    SentHigh,
    SentLow,
    /// Permit held and the response timeout has not elapsed.
    Waiting,
    Retransmitted,
    /// Budget exhausted; item dropped and permit released.
    GaveUp,
}

struct Outstanding {
    item: QueueItem,
    sent_at: Instant,
}

pub struct TransmitEngine<S: ByteSink> {
    sink: S,
    queues: Arc<LinkQueues>,
    gate: Arc<ResponseGate>,
    stats: Arc<LinkStats>,
    response_timeout: Duration,
    cycle_interval: Duration,
    outstanding: Option<Outstanding>,
}

impl<S: ByteSink> TransmitEngine<S> {
    pub fn new(
        sink: S,
        queues: Arc<LinkQueues>,
        gate: Arc<ResponseGate>,
        stats: Arc<LinkStats>,
    ) -> Self {
        Self {
            sink,
            queues,
            gate,
            stats,
            response_timeout: RESPONSE_TIMEOUT,
            cycle_interval: TX_CYCLE,
            outstanding: None,
        }
    }

    pub fn with_timing(mut self, response_timeout: Duration, cycle_interval: Duration) -> Self {
        self.response_timeout = response_timeout;
        self.cycle_interval = cycle_interval;
        self
    }

    /// Whether a low-priority packet is waiting for its RESPONSE.
    pub fn has_outstanding(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn cycle(&mut self, now: Instant) -> CycleOutcome {
        if let Some(item) = self.queues.tx_high.pop() {
            self.write(&item.packet);
            self.stats.inc_sent_high();
            return CycleOutcome::SentHigh;
        }

        if !self.gate.is_held() {
            if let Some(done) = self.outstanding.take() {
                debug!(
                    "{:?} answered after {:?}",
                    done.item.packet.packet_type(),
                    now.saturating_duration_since(done.sent_at)
                );
            }
            return self.send_next_low(now);
        }

        let timeout = self.response_timeout;
        let Some(current) = self.outstanding.as_mut() else {
            return CycleOutcome::Waiting;
        };
        if now.saturating_duration_since(current.sent_at) < timeout {
            return CycleOutcome::Waiting;
        }

        if current.item.attempts_left > 0 {
            current.item.attempts_left -= 1;
            current.sent_at = now;
            let packet = current.item.packet.clone();
            debug!(
                "No response within {:?}, resending ({} attempts left)",
                timeout, current.item.attempts_left
            );
            self.write(&packet);
            self.stats.inc_retransmissions();
            return CycleOutcome::Retransmitted;
        }

        if let Some(failed) = self.outstanding.take() {
            warn!(
                "Max attempts reached for {:?} queued {:?} ago, giving up",
                failed.item.packet,
                now.saturating_duration_since(failed.item.enqueued_at)
            );
        }
        self.stats.inc_delivery_failures();
        self.gate.release();
        CycleOutcome::GaveUp
    }

    fn send_next_low(&mut self, now: Instant) -> CycleOutcome {
        while let Some(mut item) = self.queues.tx_low.pop() {
            if item.is_exhausted() {
                warn!("Discarding {:?}: no attempts left", item.packet);
                self.stats.inc_delivery_failures();
                continue;
            }
            if !self.gate.try_acquire() {
                self.queues.tx_low.push_front(item);
                return CycleOutcome::Waiting;
            }
            item.attempts_left -= 1;
            self.write(&item.packet);
            self.stats.inc_sent_low();
            self.outstanding = Some(Outstanding { item, sent_at: now });
            return CycleOutcome::SentLow;
        }
        CycleOutcome::Idle
    }

    fn write(&mut self, packet: &Packet) {
        let bytes = packet.encode();
        debug!("TX {} bytes: {}", bytes.len(), hex_snippet(&bytes, 32));
        if let Err(e) = self.sink.write(&bytes) {
            self.stats.inc_write_errors();
            error!("Write of {:?} failed: {}", packet.packet_type(), e);
        }
    }

    pub async fn run(mut self, mut control_rx: mpsc::UnboundedReceiver<ControlMessage>) -> Result<()> {
        info!("Starting transmit task");
        let mut interval = tokio::time::interval(self.cycle_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = control_rx.recv() => {
                    match msg {
                        Some(ControlMessage::Shutdown) => {
                            info!("Transmit task received shutdown signal");
                            break;
                        }
                        None => {
                            warn!("Control channel closed, shutting down transmit task");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    self.cycle(Instant::now());
                }
            }
        }

        let pending = self.queues.tx_high.len() + self.queues.tx_low.len();
        if pending > 0 || self.outstanding.is_some() {
            info!(
                "Transmit task stopping with {} queued packet(s){}",
                pending,
                if self.outstanding.is_some() { " and one awaiting response" } else { "" }
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esp3::PacketType;
    use crate::link::queue::{PacketSender, MAX_RETRANSMISSION};
    use crate::link::transport::MemorySink;

    struct Rig {
        engine: TransmitEngine<MemorySink>,
        sink: MemorySink,
        sender: PacketSender,
        gate: Arc<ResponseGate>,
        stats: Arc<LinkStats>,
    }

    fn rig() -> Rig {
        let queues = Arc::new(LinkQueues::new());
        let gate = Arc::new(ResponseGate::new());
        let stats = Arc::new(LinkStats::new());
        let sink = MemorySink::new();
        let engine = TransmitEngine::new(sink.clone(), queues.clone(), gate.clone(), stats.clone());
        Rig {
            engine,
            sink,
            sender: PacketSender::new(queues, MAX_RETRANSMISSION),
            gate,
            stats,
        }
    }

    fn cmd(code: u8) -> Packet {
        Packet::new(PacketType::CommonCommand, vec![code], vec![]).unwrap()
    }

    #[test]
    fn high_goes_first_without_permit() {
        let mut r = rig();
        let t0 = Instant::now();
        r.sender.send(cmd(1));
        r.sender.send_urgent(cmd(2));
        assert_eq!(r.engine.cycle(t0), CycleOutcome::SentHigh);
        assert!(!r.gate.is_held());
        assert_eq!(r.engine.cycle(t0), CycleOutcome::SentLow);
        assert!(r.gate.is_held());
        let frames = r.sink.frames();
        assert_eq!(frames[0], cmd(2).encode());
        assert_eq!(frames[1], cmd(1).encode());
    }

    #[test]
    fn single_flight_until_response() {
        let mut r = rig();
        let t0 = Instant::now();
        r.sender.send(cmd(1));
        r.sender.send(cmd(2));
        assert_eq!(r.engine.cycle(t0), CycleOutcome::SentLow);
        assert_eq!(r.engine.cycle(t0 + Duration::from_millis(100)), CycleOutcome::Waiting);
        assert_eq!(r.sink.len(), 1);

        assert!(r.gate.release());
        assert_eq!(r.engine.cycle(t0 + Duration::from_millis(120)), CycleOutcome::SentLow);
        assert_eq!(r.sink.frames()[1], cmd(2).encode());
        assert!(r.engine.has_outstanding());
    }

    #[test]
    fn retransmission_stops_after_budget() {
        let mut r = rig();
        let t0 = Instant::now();
        r.sender.send(cmd(3));
        assert_eq!(r.engine.cycle(t0), CycleOutcome::SentLow);
        let step = RESPONSE_TIMEOUT;
        assert_eq!(r.engine.cycle(t0 + step), CycleOutcome::Retransmitted);
        assert_eq!(r.engine.cycle(t0 + step * 2), CycleOutcome::Retransmitted);
        assert_eq!(r.engine.cycle(t0 + step * 3), CycleOutcome::GaveUp);
        assert_eq!(r.engine.cycle(t0 + step * 4), CycleOutcome::Idle);

        assert_eq!(r.sink.len(), MAX_RETRANSMISSION as usize);
        assert!(!r.gate.is_held());
        let snap = r.stats.snapshot();
        assert_eq!(snap.sent_low, 1);
        assert_eq!(snap.retransmissions, 2);
        assert_eq!(snap.delivery_failures, 1);
    }

    #[test]
    fn exhausted_heads_are_discarded() {
        let mut r = rig();
        let queues = r.sender.queues().clone();
        queues.tx_low.push(QueueItem::new(cmd(9), 0));
        r.sender.send(cmd(1));
        assert_eq!(r.engine.cycle(Instant::now()), CycleOutcome::SentLow);
        assert_eq!(r.sink.frames(), vec![cmd(1).encode()]);
        assert_eq!(r.stats.snapshot().delivery_failures, 1);
    }

    #[test]
    fn write_errors_are_counted_not_fatal() {
        let mut r = rig();
        r.sink.set_failing(true);
        r.sender.send_urgent(cmd(1));
        assert_eq!(r.engine.cycle(Instant::now()), CycleOutcome::SentHigh);
        assert_eq!(r.stats.snapshot().write_errors, 1);
    }
}
