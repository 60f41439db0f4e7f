//! Byte transport between the link and the transceiver.
//!
//! Outgoing frames go through a [`ByteSink`]; incoming bytes are pushed into
//! [`FrameReceiver::on_bytes`](super::receiver::FrameReceiver::on_bytes) by
//! whoever owns the source (the [`SerialReader`] task for a real port, the
//! test itself otherwise).

use std::io;
use std::sync::{Arc, Mutex};

#[cfg(feature = "serial")]
use std::io::{Read, Write};
#[cfg(feature = "serial")]
use std::time::Duration;

#[cfg(feature = "serial")]
use anyhow::{anyhow, Result};
#[cfg(feature = "serial")]
use log::{debug, info, trace, warn};
#[cfg(feature = "serial")]
use serialport::SerialPort;
#[cfg(feature = "serial")]
use tokio::sync::mpsc;
#[cfg(feature = "serial")]
use tokio::time::sleep;

#[cfg(feature = "serial")]
use super::receiver::FrameReceiver;
#[cfg(feature = "serial")]
use super::ControlMessage;
#[cfg(feature = "serial")]
use crate::logutil::hex_snippet;

/// Destination for encoded frames. One call carries exactly one frame.
pub trait ByteSink: Send {
    fn write(&mut self, frame: &[u8]) -> io::Result<()>;
}

impl ByteSink for Box<dyn ByteSink> {
    fn write(&mut self, frame: &[u8]) -> io::Result<()> {
        (**self).write(frame)
    }
}

/// Sink that records every frame in memory. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames written so far, oldest first.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut g) = self.frames.lock() {
            g.clear();
        }
    }

    /// Make subsequent writes fail with `BrokenPipe`.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut g) = self.failing.lock() {
            *g = failing;
        }
    }
}

impl ByteSink for MemorySink {
    fn write(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.failing.lock().map(|g| *g).unwrap_or(false) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        self.frames
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "sink poisoned"))?
            .push(frame.to_vec());
        Ok(())
    }
}

#[cfg(feature = "serial")]
pub type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// Open the transceiver's serial port (8N1), shared between reader and sink.
#[cfg(feature = "serial")]
pub async fn open_shared_port(port_name: &str, baud_rate: u32) -> Result<SharedPort> {
    debug!("Opening serial port {} at {} baud", port_name, baud_rate);

    let mut builder = serialport::new(port_name, baud_rate).timeout(Duration::from_millis(100));
    #[cfg(unix)]
    {
        builder = builder
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None);
    }
    let port = builder
        .open()
        .map_err(|e| anyhow!("Failed to open serial port {}: {}", port_name, e))?;

    // Let the USB bridge settle before the first command.
    sleep(Duration::from_millis(100)).await;
    if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
        debug!("Could not purge input buffer: {}", e);
    }

    info!("Serial port {} open", port_name);
    Ok(Arc::new(Mutex::new(port)))
}

/// [`ByteSink`] over a shared serial port.
#[cfg(feature = "serial")]
pub struct SerialSink {
    port: SharedPort,
}

#[cfg(feature = "serial")]
impl SerialSink {
    pub fn new(port: SharedPort) -> Self {
        Self { port }
    }
}

#[cfg(feature = "serial")]
impl ByteSink for SerialSink {
    fn write(&mut self, frame: &[u8]) -> io::Result<()> {
        let mut port = self
            .port
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "serial port mutex poisoned"))?;
        port.write_all(frame)?;
        port.flush()
    }
}

/// Polls the serial port and feeds the frame receiver.
#[cfg(feature = "serial")]
pub struct SerialReader {
    port: SharedPort,
    receiver: FrameReceiver,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
}

#[cfg(feature = "serial")]
impl SerialReader {
    pub fn new(
        port: SharedPort,
        receiver: FrameReceiver,
        control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    ) -> Self {
        Self {
            port,
            receiver,
            control_rx,
        }
    }

    /// Read until shutdown. A failed read other than a timeout ends the task
    /// with the error; there is no reconnection.
    pub async fn run(mut self) -> Result<()> {
        info!("Starting serial reader task");
        let mut interval = tokio::time::interval(Duration::from_millis(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                msg = self.control_rx.recv() => {
                    match msg {
                        Some(ControlMessage::Shutdown) => {
                            info!("Serial reader received shutdown signal");
                            break;
                        }
                        None => {
                            warn!("Control channel closed, shutting down serial reader");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    self.read_available()?;
                }
            }
        }

        info!("Serial reader task shutting down");
        Ok(())
    }

    fn read_available(&mut self) -> Result<()> {
        let mut buffer = [0u8; 512];
        let read = {
            let mut port = self
                .port
                .lock()
                .map_err(|_| anyhow!("serial port mutex poisoned"))?;
            match port.bytes_to_read() {
                Ok(0) => return Ok(()),
                Ok(_) => port.read(&mut buffer),
                Err(e) => return Err(anyhow!("Serial port status failed: {}", e)),
            }
        };

        match read {
            Ok(0) => Ok(()),
            Ok(n) => {
                trace!("RX {} bytes: {}", n, hex_snippet(&buffer[..n], 64));
                self.receiver.on_bytes(&buffer[..n]);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(()),
            Err(e) => Err(anyhow!("Serial read failed: {}", e)),
        }
    }
}
