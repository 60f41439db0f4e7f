//! Transmit/receive priority queues.
//!
//! Four independent FIFOs (TX high/low, RX high/low), each a `VecDeque`
//! behind its own mutex. Unbounded; producers never block.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use log::debug;

use crate::esp3::Packet;

/// Attempts a low-priority packet gets before it is reported as failed.
pub const MAX_RETRANSMISSION: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Time-bounded protocol handshakes (answer within 500 ms).
    High,
    /// Ordinary commands and telegrams.
    Low,
}

/// A packet waiting for (re)transmission.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub packet: Packet,
    /// Transmissions still allowed; 0 means exhausted.
    pub attempts_left: u8,
    pub enqueued_at: Instant,
}

impl QueueItem {
    pub fn new(packet: Packet, attempts: u8) -> Self {
        Self {
            packet,
            attempts_left: attempts,
            enqueued_at: Instant::now(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts_left == 0
    }
}

/// Thread-safe FIFO.
#[derive(Debug)]
pub struct PacketQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> Default for PacketQueue<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> PacketQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panicking producer cannot leave a VecDeque half-updated, so the
        // data is still consistent after poisoning.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Put an item back at the head, ahead of everything queued.
    pub fn push_front(&self, item: T) {
        self.lock().push_front(item);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return everything queued.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }
}

/// The four queues shared by the receiver, transmitter and delivery loop.
#[derive(Debug, Default)]
pub struct LinkQueues {
    pub tx_high: PacketQueue<QueueItem>,
    pub tx_low: PacketQueue<QueueItem>,
    pub rx_high: PacketQueue<Packet>,
    pub rx_low: PacketQueue<Packet>,
}

impl LinkQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rx(&self, priority: Priority) -> &PacketQueue<Packet> {
        match priority {
            Priority::High => &self.rx_high,
            Priority::Low => &self.rx_low,
        }
    }

    pub fn tx(&self, priority: Priority) -> &PacketQueue<QueueItem> {
        match priority {
            Priority::High => &self.tx_high,
            Priority::Low => &self.tx_low,
        }
    }
}

/// Cloneable handle for queueing outgoing packets.
#[derive(Debug, Clone)]
pub struct PacketSender {
    queues: Arc<LinkQueues>,
    max_attempts: u8,
}

impl PacketSender {
    pub fn new(queues: Arc<LinkQueues>, max_attempts: u8) -> Self {
        Self {
            queues,
            max_attempts,
        }
    }

    pub fn send_with_priority(&self, packet: Packet, priority: Priority) {
        debug!(
            "Queueing {:?} packet ({} bytes) at {:?} priority",
            packet.packet_type(),
            packet.wire_len(),
            priority
        );
        let attempts = match priority {
            Priority::High => 1,
            Priority::Low => self.max_attempts,
        };
        self.queues.tx(priority).push(QueueItem::new(packet, attempts));
    }

    /// Queue a command that expects a RESPONSE; retried until answered.
    pub fn send(&self, packet: Packet) {
        self.send_with_priority(packet, Priority::Low);
    }

    /// Queue a packet that must go out on the next transmit cycle.
    pub fn send_urgent(&self, packet: Packet) {
        self.send_with_priority(packet, Priority::High);
    }

    pub fn queues(&self) -> &Arc<LinkQueues> {
        &self.queues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esp3::PacketType;

    fn pkt(b: u8) -> Packet {
        Packet::new(PacketType::CommonCommand, vec![b], vec![]).unwrap()
    }

    #[test]
    fn fifo_per_queue() {
        let q = PacketQueue::new();
        q.push(pkt(1));
        q.push(pkt(2));
        q.push_front(pkt(0));
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop().unwrap().data(), &[0]);
        assert_eq!(q.pop().unwrap().data(), &[1]);
        assert_eq!(q.drain().len(), 1);
        assert!(q.is_empty());
    }

    #[test]
    fn sender_sets_attempt_budget_by_priority() {
        let queues = Arc::new(LinkQueues::new());
        let sender = PacketSender::new(queues.clone(), MAX_RETRANSMISSION);
        sender.send(pkt(1));
        sender.send_urgent(pkt(2));
        assert_eq!(queues.tx_low.pop().unwrap().attempts_left, MAX_RETRANSMISSION);
        let urgent = queues.tx_high.pop().unwrap();
        assert_eq!(urgent.attempts_left, 1);
        assert!(!urgent.is_exhausted());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let queues = Arc::new(LinkQueues::new());
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let q = queues.clone();
                std::thread::spawn(move || {
                    for i in 0..250u8 {
                        q.rx_low.push(pkt(t.wrapping_mul(i)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(queues.rx(Priority::Low).len(), 1000);
    }
}
