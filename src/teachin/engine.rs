use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::ute::{build_response, UteQuery, UteRequest, UteResponseCode};
use super::{TeachInListener, TeachInState, TeachInTarget};
use crate::device::{
    Address, Device, DeviceRegistry, EepId, MANUFACTURER_UNKNOWN, ONE_BS_PROFILE,
    RPS_DEFAULT_PROFILE,
};
use crate::error::TelegramError;
use crate::esp3::telegram::LRN_BIT;
use crate::esp3::{Packet, Rorg, Telegram, TelegramKind};
use crate::link::{FrameListener, PacketSender};

/// 4BS teach-in with DB0.7 set carries FUNC/TYPE/manufacturer.
const LRN_TYPE_BIT: u8 = 0x80;

/// Longest teach-in window; longer requests are clamped.
pub const MAX_TEACH_IN_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

enum Registration {
    Created(Device),
    /// The window closed (or was retargeted) before the device was created.
    Closed,
    Failed,
}

/// What the engine did with one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeachInOutcome {
    /// Not a radio telegram the engine can read.
    Ignored,
    /// Sender already known; routed to `on_registered_device_found`.
    Registered(Device),
    /// Unknown sender while teach-in is disabled.
    NotLearning,
    /// Unknown sender, but teach-in is restricted to another address.
    NotTarget,
    /// Data telegram from an unknown sender (learn bit not cleared).
    NotTeachIn,
    /// New device created and announced.
    Learned(Device),
    /// The registry refused the device.
    Rejected,
    /// 4BS teach-in without a profile and no target profile to fall back on.
    NoProfile,
    /// A UTE response was queued.
    UteAnswered {
        code: UteResponseCode,
        device: Option<Device>,
    },
}

/// Pairing state machine. Register it as a [`FrameListener`] on the link so
/// it sees every received packet and the delivery tick.
pub struct TeachInEngine {
    registry: Arc<dyn DeviceRegistry>,
    sender: PacketSender,
    state: Mutex<TeachInState>,
    listeners: Mutex<Vec<Arc<dyn TeachInListener>>>,
}

impl TeachInEngine {
    pub fn new(registry: Arc<dyn DeviceRegistry>, sender: PacketSender) -> Self {
        Self {
            registry,
            sender,
            state: Mutex::new(TeachInState::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TeachInState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_listener(&self, listener: Arc<dyn TeachInListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    fn for_each_listener(&self, f: impl Fn(&dyn TeachInListener)) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }

    pub fn state(&self) -> TeachInState {
        *self.lock_state()
    }

    pub fn is_enabled(&self) -> bool {
        self.lock_state().is_enabled()
    }

    /// Open a teach-in window. Returns `false` (and changes nothing) if one is
    /// already open.
    pub fn enable(&self, timeout: Duration) -> bool {
        self.open(timeout, None)
    }

    /// Open a teach-in window for one device. `eep` is used when its
    /// telegram does not carry a profile; the window closes once it pairs.
    pub fn enable_for(&self, address: Address, eep: EepId, timeout: Duration) -> bool {
        self.open(timeout, Some(TeachInTarget { address, eep }))
    }

    fn open(&self, timeout: Duration, target: Option<TeachInTarget>) -> bool {
        {
            let mut state = self.lock_state();
            if state.is_enabled() {
                debug!("Teach-in already enabled");
                return false;
            }
            let now = Instant::now();
            if timeout > MAX_TEACH_IN_WINDOW {
                warn!("Teach-in timeout {:?} clamped to {:?}", timeout, MAX_TEACH_IN_WINDOW);
            }
            let deadline = now
                .checked_add(timeout.min(MAX_TEACH_IN_WINDOW))
                .unwrap_or(now);
            state.deadline = Some(deadline);
            state.target = target;
        }
        match target {
            Some(t) => info!("Teach-in enabled for {} ({}) for {:?}", t.address, t.eep, timeout),
            None => info!("Teach-in enabled for {:?}", timeout),
        }
        self.for_each_listener(|l| l.on_teach_in_started());
        true
    }

    /// Close the teach-in window. Returns `false` if it was not open; no
    /// listener is notified in that case.
    pub fn disable(&self) -> bool {
        {
            let mut state = self.lock_state();
            if !state.is_enabled() {
                return false;
            }
            *state = TeachInState::default();
        }
        info!("Teach-in disabled");
        self.for_each_listener(|l| l.on_teach_in_ended());
        true
    }

    /// Close the window if its deadline has passed at `now`.
    pub fn check_expiry(&self, now: Instant) -> bool {
        {
            let mut state = self.lock_state();
            match state.deadline {
                Some(deadline) if now >= deadline => *state = TeachInState::default(),
                _ => return false,
            }
        }
        info!("Teach-in window expired");
        self.for_each_listener(|l| l.on_teach_in_ended());
        true
    }

    pub fn handle_packet(&self, packet: &Packet) -> TeachInOutcome {
        self.check_expiry(Instant::now());

        let telegram = match Telegram::parse(packet) {
            Ok(t) => t,
            Err(TelegramError::NotRadio(_)) => return TeachInOutcome::Ignored,
            Err(e) => {
                debug!("Not a usable radio telegram: {}", e);
                return TeachInOutcome::Ignored;
            }
        };
        let sender = telegram.sender();

        if let Some(device) = self.registry.lookup(sender) {
            self.for_each_listener(|l| l.on_registered_device_found(&device, packet));
            return TeachInOutcome::Registered(device);
        }

        let state = self.state();
        if !state.is_enabled() {
            debug!(
                "Ignoring {:?} telegram from unknown {}: teach-in disabled",
                telegram.kind(),
                sender
            );
            return TeachInOutcome::NotLearning;
        }
        if let Some(target) = state.target {
            if target.address != sender {
                debug!("Ignoring {}: teach-in restricted to {}", sender, target.address);
                return TeachInOutcome::NotTarget;
            }
        }
        let fallback = state.target.map(|t| t.eep);

        match telegram.kind() {
            TelegramKind::UteTeachIn => self.handle_ute(&telegram),
            TelegramKind::Rps => {
                self.learn(&telegram, MANUFACTURER_UNKNOWN, fallback.unwrap_or(RPS_DEFAULT_PROFILE))
            }
            TelegramKind::OneByte if telegram.is_teach_in() => {
                self.learn(&telegram, MANUFACTURER_UNKNOWN, fallback.unwrap_or(ONE_BS_PROFILE))
            }
            TelegramKind::FourBsTeachIn => match carried_profile(telegram.payload()) {
                Some((eep, manufacturer)) => self.learn(&telegram, manufacturer, eep),
                None => match fallback {
                    Some(eep) => self.learn(&telegram, MANUFACTURER_UNKNOWN, eep),
                    None => {
                        info!(
                            "4BS teach-in from {} without profile: bidirectional teach-in unsupported",
                            sender
                        );
                        TeachInOutcome::NoProfile
                    }
                },
            },
            TelegramKind::OneByte | TelegramKind::FourByte | TelegramKind::VariableLength => {
                debug!("Data telegram from unknown {} while teaching in", sender);
                TeachInOutcome::NotTeachIn
            }
        }
    }

    fn learn(&self, telegram: &Telegram<'_>, manufacturer: u16, eep: EepId) -> TeachInOutcome {
        match self.register(telegram, manufacturer, eep) {
            Registration::Created(device) => TeachInOutcome::Learned(device),
            Registration::Closed => TeachInOutcome::NotLearning,
            Registration::Failed => TeachInOutcome::Rejected,
        }
    }

    /// Create the device, announce it and close a targeted window.
    ///
    /// The window is re-checked and the device created under the state lock,
    /// so a concurrent `disable` either wins outright or happens after.
    fn register(&self, telegram: &Telegram<'_>, manufacturer: u16, eep: EepId) -> Registration {
        let sender = telegram.sender();
        let (created, closed_window) = {
            let mut state = self.lock_state();
            if !state.is_enabled() || state.target.is_some_and(|t| t.address != sender) {
                debug!("Teach-in window closed before {} could be learned", sender);
                return Registration::Closed;
            }
            let created = self.registry.create(sender, manufacturer, eep);
            let closed_window = created.is_ok() && state.target.is_some();
            if closed_window {
                *state = TeachInState::default();
            }
            (created, closed_window)
        };
        match created {
            Ok(device) => {
                info!("Learned {} as {} via {:?}", sender, eep, telegram.kind());
                self.for_each_listener(|l| l.on_device_found(&device));
                if closed_window {
                    info!("Teach-in disabled");
                    self.for_each_listener(|l| l.on_teach_in_ended());
                }
                Registration::Created(device)
            }
            Err(e) => {
                warn!("Teach-in of {} as {} failed: {}", sender, eep, e);
                Registration::Failed
            }
        }
    }

    fn handle_ute(&self, telegram: &Telegram<'_>) -> TeachInOutcome {
        let query = match UteQuery::from_telegram(telegram) {
            Ok(q) => q,
            Err(e) => {
                warn!("Malformed UTE telegram from {}: {}", telegram.sender(), e);
                return TeachInOutcome::Ignored;
            }
        };
        if !query.is_query() {
            debug!("Ignoring UTE response from {}", telegram.sender());
            return TeachInOutcome::Ignored;
        }

        let (code, device) = match query.request {
            UteRequest::TeachIn if self.registry.is_profile_supported(query.eep) => {
                match self.register(telegram, query.manufacturer, query.eep) {
                    Registration::Created(device) => (UteResponseCode::Success, Some(device)),
                    Registration::Closed => return TeachInOutcome::NotLearning,
                    Registration::Failed => (UteResponseCode::Refused, None),
                }
            }
            UteRequest::TeachIn => {
                info!("UTE teach-in of {} refused: {} unsupported", telegram.sender(), query.eep);
                (UteResponseCode::Refused, None)
            }
            UteRequest::Deletion => {
                self.disable();
                (UteResponseCode::DeletionAccepted, None)
            }
            UteRequest::Unspecified | UteRequest::NotUsed => (UteResponseCode::Refused, None),
        };

        match build_response(&query, code, telegram.sender()) {
            Ok(response) if query.response_required => self.sender.send_urgent(response),
            Ok(response) => self.sender.send(response),
            Err(e) => warn!("Could not build UTE response: {}", e),
        }
        TeachInOutcome::UteAnswered { code, device }
    }
}

impl FrameListener for TeachInEngine {
    fn on_frame(&self, packet: &Packet) {
        self.handle_packet(packet);
    }

    fn on_tick(&self, now: Instant) {
        self.check_expiry(now);
    }
}

/// EEP and manufacturer of a 4BS teach-in telegram whose LRN-type bit is set.
pub fn carried_profile(payload: &[u8]) -> Option<(EepId, u16)> {
    let [db3, db2, db1, db0] = <[u8; 4]>::try_from(payload.get(..4)?).ok()?;
    if db0 & LRN_BIT != 0 || db0 & LRN_TYPE_BIT == 0 {
        return None;
    }
    let func = db3 >> 2;
    let type_ = ((db3 & 0x03) << 5) | (db2 >> 3);
    let manufacturer = (u16::from(db2 & 0x07) << 8) | u16::from(db1);
    Some((EepId::new(Rorg::FourBs.code(), func, type_), manufacturer))
}
