//! # Link layer
//!
//! Moves ESP3 packets between the application and the transceiver:
//!
//! - [`receiver`] - byte stream → validated packets → RX queues
//! - [`queue`] - the four priority FIFOs and the [`PacketSender`] handle
//! - [`gate`] - the single outstanding-response permit
//! - [`transmitter`] - TX queues → sink, with timeout and retransmission
//! - [`delivery`] - RX queues → [`FrameListener`]s
//! - [`transport`] - [`ByteSink`] implementations and the serial reader
//!
//! [`Link::start`] wires these together and spawns the transmit and delivery
//! tasks on the current tokio runtime.
//!
//! ```rust,no_run
//! use enocean_link::esp3::CommonCommand;
//! use enocean_link::link::{Link, LinkTuning, MemorySink};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let link = Link::start(MemorySink::new(), LinkTuning::default());
//! link.sender().send(CommonCommand::ReadVersion.packet()?);
//! link.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod delivery;
pub mod gate;
pub mod queue;
pub mod receiver;
pub mod transmitter;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use delivery::{DeliveryLoop, FrameListener, ListenerId, ListenerSet, UnobservedPolicy};
pub use gate::ResponseGate;
pub use queue::{LinkQueues, PacketSender, Priority, QueueItem, MAX_RETRANSMISSION};
pub use receiver::FrameReceiver;
pub use transmitter::{CycleOutcome, TransmitEngine, RESPONSE_TIMEOUT};
pub use transport::{ByteSink, MemorySink};

use crate::metrics::LinkStats;

/// Control messages for coordinating between tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Shutdown,
}

/// Runtime knobs for a [`Link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTuning {
    pub response_timeout: Duration,
    /// Attempts per low-priority packet, first send included.
    pub max_attempts: u8,
    pub tx_cycle: Duration,
    pub delivery_cycle: Duration,
    pub unobserved: UnobservedPolicy,
}

impl Default for LinkTuning {
    fn default() -> Self {
        Self {
            response_timeout: RESPONSE_TIMEOUT,
            max_attempts: MAX_RETRANSMISSION,
            tx_cycle: transmitter::TX_CYCLE,
            delivery_cycle: delivery::DELIVERY_CYCLE,
            unobserved: UnobservedPolicy::default(),
        }
    }
}

/// A running link: shared queues plus the transmit and delivery tasks.
pub struct Link {
    queues: Arc<LinkQueues>,
    gate: Arc<ResponseGate>,
    stats: Arc<LinkStats>,
    listeners: Arc<ListenerSet>,
    sender: PacketSender,
    controls: Vec<mpsc::UnboundedSender<ControlMessage>>,
    tasks: Vec<(&'static str, JoinHandle<Result<()>>)>,
}

impl Link {
    /// Spawn the transmit and delivery tasks writing to `sink`.
    ///
    /// Must be called from within a tokio runtime. Incoming bytes are fed
    /// through a [`FrameReceiver`] obtained from [`Link::receiver`].
    pub fn start<S: ByteSink + 'static>(sink: S, tuning: LinkTuning) -> Self {
        let queues = Arc::new(LinkQueues::new());
        let gate = Arc::new(ResponseGate::new());
        let stats = Arc::new(LinkStats::new());
        let listeners = Arc::new(ListenerSet::new());
        let sender = PacketSender::new(queues.clone(), tuning.max_attempts.max(1));

        let mut link = Self {
            queues: queues.clone(),
            gate: gate.clone(),
            stats: stats.clone(),
            listeners: listeners.clone(),
            sender,
            controls: Vec::new(),
            tasks: Vec::new(),
        };

        let engine = TransmitEngine::new(sink, queues.clone(), gate, stats.clone())
            .with_timing(tuning.response_timeout, tuning.tx_cycle);
        let (tx_control, tx_control_rx) = mpsc::unbounded_channel();
        link.controls.push(tx_control);
        link.tasks
            .push(("transmit", tokio::spawn(engine.run(tx_control_rx))));

        let delivery = DeliveryLoop::new(queues, listeners, stats)
            .with_policy(tuning.unobserved)
            .with_cycle(tuning.delivery_cycle);
        let (dl_control, dl_control_rx) = mpsc::unbounded_channel();
        link.controls.push(dl_control);
        link.tasks
            .push(("delivery", tokio::spawn(delivery.run(dl_control_rx))));

        info!(
            "Link started (response timeout {:?}, {} attempts)",
            tuning.response_timeout, tuning.max_attempts
        );
        link
    }

    /// Open `port_name` and start a link over it, including the reader task.
    #[cfg(feature = "serial")]
    pub async fn open_serial(port_name: &str, baud_rate: u32, tuning: LinkTuning) -> Result<Self> {
        let port = transport::open_shared_port(port_name, baud_rate).await?;
        let mut link = Self::start(transport::SerialSink::new(port.clone()), tuning);
        let (control, control_rx) = mpsc::unbounded_channel();
        let reader = transport::SerialReader::new(port, link.receiver(), control_rx);
        link.controls.push(control);
        link.tasks.push(("serial reader", tokio::spawn(reader.run())));
        Ok(link)
    }

    /// A receiver feeding this link. Use one per byte source.
    pub fn receiver(&self) -> FrameReceiver {
        FrameReceiver::new(self.queues.clone(), self.gate.clone(), self.stats.clone())
    }

    pub fn sender(&self) -> PacketSender {
        self.sender.clone()
    }

    pub fn add_listener(&self, listener: Arc<dyn FrameListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }

    pub fn queues(&self) -> &Arc<LinkQueues> {
        &self.queues
    }

    /// Whether a low-priority exchange is waiting for its RESPONSE.
    pub fn response_pending(&self) -> bool {
        self.gate.is_held()
    }

    /// Signal every task to stop and wait for them. The first task error is
    /// returned after all tasks have finished.
    pub async fn shutdown(self) -> Result<()> {
        for control in &self.controls {
            let _ = control.send(ControlMessage::Shutdown);
        }
        let mut first_error = None;
        for (name, task) in self.tasks {
            let outcome = match task.await {
                Ok(result) => result,
                Err(e) => Err(anyhow!("{} task panicked: {}", name, e)),
            };
            if let Err(e) = outcome {
                warn!("{} task ended with error: {}", name, e);
                first_error.get_or_insert(e);
            }
        }
        info!("Link stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
