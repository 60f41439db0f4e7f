//! Link counters.
//!
//! One [`LinkStats`] lives in each link instance (shared by `Arc` between the
//! receiver, transmitter and delivery tasks), so independent links and tests
//! never see each other's numbers.
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LinkStats {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    responses_received: AtomicU64,
    sent_high: AtomicU64,
    sent_low: AtomicU64,
    retransmissions: AtomicU64,
    delivery_failures: AtomicU64,
    write_errors: AtomicU64,
    delivered: AtomicU64,
    discarded_unobserved: AtomicU64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_frames_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_responses_received(&self) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_sent_high(&self) {
        self.sent_high.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_sent_low(&self) {
        self.sent_low.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_retransmissions(&self) {
        self.retransmissions.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_delivery_failures(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_write_errors(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_discarded_unobserved(&self, n: u64) {
        self.discarded_unobserved.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            sent_high: self.sent_high.load(Ordering::Relaxed),
            sent_low: self.sent_low.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            discarded_unobserved: self.discarded_unobserved.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Snapshot {
    pub frames_received: u64,
    /// Malformed frames (checksum or framing errors).
    pub frames_dropped: u64,
    pub responses_received: u64,
    pub sent_high: u64,
    /// Low-priority first attempts (retransmissions counted separately).
    pub sent_low: u64,
    pub retransmissions: u64,
    pub delivery_failures: u64,
    pub write_errors: u64,
    /// Packets handed to listeners.
    pub delivered: u64,
    pub discarded_unobserved: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_per_instance() {
        let a = LinkStats::new();
        let b = LinkStats::new();
        a.inc_sent_low();
        a.inc_retransmissions();
        a.inc_retransmissions();
        a.add_discarded_unobserved(3);
        let snap = a.snapshot();
        assert_eq!(snap.sent_low, 1);
        assert_eq!(snap.retransmissions, 2);
        assert_eq!(snap.discarded_unobserved, 3);
        assert_eq!(b.snapshot(), Snapshot::default());
    }
}
