//! Delivery loop: RX queues → registered listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::queue::LinkQueues;
use super::ControlMessage;
use crate::esp3::Packet;
use crate::metrics::LinkStats;

/// Pause between delivery cycles.
pub const DELIVERY_CYCLE: Duration = Duration::from_millis(20);

/// Receives every packet the link accepts.
///
/// Callbacks run on the delivery task, one packet at a time; a slow listener
/// delays everything behind it.
pub trait FrameListener: Send + Sync {
    fn on_frame(&self, packet: &Packet);

    /// Called once per delivery cycle while registered.
    fn on_tick(&self, _now: Instant) {}
}

/// What happens to received packets while nobody is listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnobservedPolicy {
    /// Discard them (and count the discards).
    #[default]
    Drop,
    /// Keep them queued until a listener registers.
    Retain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerSet {
    entries: Mutex<Vec<(ListenerId, Arc<dyn FrameListener>)>>,
    next_id: AtomicU64,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn FrameListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    /// `false` if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current listeners; callbacks run on this copy so a listener may
    /// register or remove listeners without deadlocking.
    fn snapshot(&self) -> Vec<Arc<dyn FrameListener>> {
        self.entries
            .lock()
            .map(|g| g.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }
}

pub struct DeliveryLoop {
    queues: Arc<LinkQueues>,
    listeners: Arc<ListenerSet>,
    stats: Arc<LinkStats>,
    policy: UnobservedPolicy,
    cycle_interval: Duration,
}

impl DeliveryLoop {
    pub fn new(queues: Arc<LinkQueues>, listeners: Arc<ListenerSet>, stats: Arc<LinkStats>) -> Self {
        Self {
            queues,
            listeners,
            stats,
            policy: UnobservedPolicy::default(),
            cycle_interval: DELIVERY_CYCLE,
        }
    }

    pub fn with_policy(mut self, policy: UnobservedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cycle(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    /// One delivery step. Returns `true` if a packet reached the listeners.
    pub fn cycle(&self, now: Instant) -> bool {
        let listeners = self.listeners.snapshot();
        if listeners.is_empty() {
            if self.policy == UnobservedPolicy::Drop {
                let dropped = self.queues.rx_high.drain().len() + self.queues.rx_low.drain().len();
                if dropped > 0 {
                    debug!("No listeners; discarded {} received packet(s)", dropped);
                    self.stats.add_discarded_unobserved(dropped as u64);
                }
            }
            return false;
        }

        for listener in &listeners {
            listener.on_tick(now);
        }

        let Some(packet) = self.queues.rx_high.pop().or_else(|| self.queues.rx_low.pop()) else {
            return false;
        };
        for listener in &listeners {
            listener.on_frame(&packet);
        }
        self.stats.inc_delivered();
        true
    }

    pub async fn run(self, mut control_rx: mpsc::UnboundedReceiver<ControlMessage>) -> Result<()> {
        info!("Starting delivery task");
        let mut interval = tokio::time::interval(self.cycle_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                msg = control_rx.recv() => {
                    match msg {
                        Some(ControlMessage::Shutdown) => {
                            info!("Delivery task received shutdown signal");
                            break;
                        }
                        None => {
                            warn!("Control channel closed, shutting down delivery task");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    self.cycle(Instant::now());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esp3::PacketType;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u8>>,
        ticks: AtomicU64,
    }

    impl FrameListener for Recorder {
        fn on_frame(&self, packet: &Packet) {
            self.seen.lock().unwrap().push(packet.data()[0]);
        }

        fn on_tick(&self, _now: Instant) {
            self.ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn event(code: u8) -> Packet {
        Packet::new(PacketType::Event, vec![code], vec![]).unwrap()
    }

    fn setup(policy: UnobservedPolicy) -> (DeliveryLoop, Arc<LinkQueues>, Arc<ListenerSet>, Arc<LinkStats>) {
        let queues = Arc::new(LinkQueues::new());
        let listeners = Arc::new(ListenerSet::new());
        let stats = Arc::new(LinkStats::new());
        let lp = DeliveryLoop::new(queues.clone(), listeners.clone(), stats.clone()).with_policy(policy);
        (lp, queues, listeners, stats)
    }

    #[test]
    fn high_queue_drains_first_one_per_cycle() {
        let (lp, queues, listeners, stats) = setup(UnobservedPolicy::Drop);
        let rec = Arc::new(Recorder::default());
        listeners.add(rec.clone());
        queues.rx_low.push(event(4));
        queues.rx_high.push(event(2));

        assert!(lp.cycle(Instant::now()));
        assert_eq!(*rec.seen.lock().unwrap(), vec![2]);
        assert!(lp.cycle(Instant::now()));
        assert!(!lp.cycle(Instant::now()));
        assert_eq!(*rec.seen.lock().unwrap(), vec![2, 4]);
        assert_eq!(rec.ticks.load(Ordering::Relaxed), 3);
        assert_eq!(stats.snapshot().delivered, 2);
    }

    #[test]
    fn unobserved_packets_drop_or_wait() {
        let (lp, queues, _, stats) = setup(UnobservedPolicy::Drop);
        queues.rx_low.push(event(4));
        assert!(!lp.cycle(Instant::now()));
        assert!(queues.rx_low.is_empty());
        assert_eq!(stats.snapshot().discarded_unobserved, 1);

        let (lp, queues, listeners, _) = setup(UnobservedPolicy::Retain);
        queues.rx_low.push(event(4));
        assert!(!lp.cycle(Instant::now()));
        assert_eq!(queues.rx_low.len(), 1);
        listeners.add(Arc::new(Recorder::default()));
        assert!(lp.cycle(Instant::now()));
    }

    #[test]
    fn every_listener_sees_each_packet_and_removal_works() {
        let (lp, queues, listeners, _) = setup(UnobservedPolicy::Drop);
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        listeners.add(a.clone());
        let id_b = listeners.add(b.clone());
        queues.rx_low.push(event(7));
        lp.cycle(Instant::now());
        assert!(listeners.remove(id_b));
        assert!(!listeners.remove(id_b));
        queues.rx_low.push(event(8));
        lp.cycle(Instant::now());
        assert_eq!(*a.seen.lock().unwrap(), vec![7, 8]);
        assert_eq!(*b.seen.lock().unwrap(), vec![7]);
    }
}
