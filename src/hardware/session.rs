use crate::context::ScopeContext;
use crate::decode::frame::DATA_LEN;
use crate::hardware::usb_interface::{BulkIn, DeviceFilter, StreamTarget, UsbHost};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use tracing::{debug, info, warn};

/// Bytes requested per bulk transfer. Frames are told apart by length, so a
/// transfer must never hold more than the largest frame. A full 64-byte
/// packet does not end a larger transfer.
pub const TRANSFER_SIZE: usize = DATA_LEN;

/// Where the session manager currently is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Searching,
    Opening,
    Streaming,
    Closing,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Searching => "Searching",
            ConnectionStatus::Opening => "Opening",
            ConnectionStatus::Streaming => "Streaming",
            ConnectionStatus::Closing => "Closing",
        }
    }
}

/// Session counters, readable from the UI thread
#[derive(Default)]
pub struct SessionStats {
    pub frames_received: AtomicU64,
    pub stalls: AtomicU64,
    pub transport_errors: AtomicU64,
    pub sessions_opened: AtomicU64,
    status: Mutex<ConnectionStatus>,
    connected_since: Mutex<Option<DateTime<Utc>>>,
}

impl SessionStats {
    pub fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start of the current streaming session, if any
    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        *self.connected_since.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    fn set_connected_since(&self, when: Option<DateTime<Utc>>) {
        *self.connected_since.lock().unwrap_or_else(|e| e.into_inner()) = when;
    }
}

enum SessionState<H: UsbHost> {
    Searching,
    Opening {
        device: H::Device,
        target: StreamTarget,
    },
    Streaming {
        handle: H::Handle,
        target: StreamTarget,
    },
    Closing {
        handle: H::Handle,
    },
}

impl<H: UsbHost> SessionState<H> {
    fn status(&self) -> ConnectionStatus {
        match self {
            SessionState::Searching => ConnectionStatus::Searching,
            SessionState::Opening { .. } => ConnectionStatus::Opening,
            SessionState::Streaming { .. } => ConnectionStatus::Streaming,
            SessionState::Closing { .. } => ConnectionStatus::Closing,
        }
    }
}

/// Finds the capture device, streams its frames into the decoder and starts
/// over whenever the device goes away.
///
/// Searching -> Opening -> Streaming -> Closing -> Searching. A missing
/// device, a failed open and a closed session are each followed by the
/// backoff delay. Stalls while streaming are retried immediately.
pub struct SessionManager<H: UsbHost> {
    host: H,
    context: ScopeContext,
    state: SessionState<H>,
    buffer: Vec<u8>,
    /// Suppresses repeated "waiting" logs while nothing is attached
    announced_search: bool,
}

impl<H: UsbHost> SessionManager<H> {
    pub fn new(host: H, context: ScopeContext) -> Self {
        context.stats.set_status(ConnectionStatus::Searching);
        Self {
            host,
            context,
            state: SessionState::Searching,
            buffer: vec![0u8; TRANSFER_SIZE],
            announced_search: false,
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    /// Loop until the context is shut down by closing the window or by
    /// Ctrl-C. A transfer that is already blocked is not interrupted.
    pub fn run(mut self) {
        while self.context.is_running() {
            self.step();
        }
        let state = std::mem::replace(&mut self.state, SessionState::Searching);
        if let SessionState::Streaming { handle, .. } | SessionState::Closing { handle } = state {
            self.close(handle);
        }
        debug!("Session loop stopped");
    }

    /// Perform one state transition
    pub fn step(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Searching);
        self.state = match state {
            SessionState::Searching => self.search(),
            SessionState::Opening { device, target } => self.open(device, target),
            SessionState::Streaming { handle, target } => self.stream(handle, target),
            SessionState::Closing { handle } => {
                self.close(handle);
                self.backoff();
                SessionState::Searching
            }
        };
        self.context.stats.set_status(self.state.status());
    }

    fn search(&mut self) -> SessionState<H> {
        if !self.announced_search {
            info!(
                "Waiting for device {:04x}:{:04x} subclass 0x{:02x}",
                self.context.filter.vendor_id,
                self.context.filter.product_id,
                self.context.filter.subclass
            );
            self.announced_search = true;
        }

        match find_device(&mut self.host, &self.context.filter) {
            Some((device, target)) => {
                self.announced_search = false;
                SessionState::Opening { device, target }
            }
            None => {
                self.backoff();
                SessionState::Searching
            }
        }
    }

    fn open(&mut self, device: H::Device, target: StreamTarget) -> SessionState<H> {
        match self.host.open(&device, target.interface) {
            Ok(handle) => {
                info!(
                    "Streaming from interface {} endpoint 0x{:02x}",
                    target.interface, target.endpoint
                );
                self.context.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
                self.context.stats.set_connected_since(Some(Utc::now()));
                SessionState::Streaming { handle, target }
            }
            Err(e) => {
                warn!("Failed to open interface {}: {}", target.interface, e);
                self.context.stats.transport_errors.fetch_add(1, Ordering::SeqCst);
                self.backoff();
                SessionState::Searching
            }
        }
    }

    fn stream(&mut self, mut handle: H::Handle, target: StreamTarget) -> SessionState<H> {
        match handle.read_bulk(target.endpoint, &mut self.buffer) {
            Ok(len) => {
                // the lock is only taken here, never across the transfer
                self.context.decoder.apply(&self.buffer[..len]);
                self.context.stats.frames_received.fetch_add(1, Ordering::Relaxed);
                SessionState::Streaming { handle, target }
            }
            Err(e) if e.is_stall() => {
                debug!("Endpoint 0x{:02x} stalled, retrying", target.endpoint);
                self.context.stats.stalls.fetch_add(1, Ordering::Relaxed);
                SessionState::Streaming { handle, target }
            }
            Err(e) => {
                warn!("Transfer on endpoint 0x{:02x} failed: {}", target.endpoint, e);
                self.context.stats.transport_errors.fetch_add(1, Ordering::SeqCst);
                SessionState::Closing { handle }
            }
        }
    }

    /// Release the interface and close the device
    fn close(&mut self, mut handle: H::Handle) {
        if let Err(e) = handle.release() {
            debug!("Releasing interface failed: {}", e);
        }
        drop(handle);
        self.context.stats.set_connected_since(None);
        info!("Session closed");
    }

    fn backoff(&self) {
        if !self.context.backoff.is_zero() {
            thread::sleep(self.context.backoff);
        }
    }
}

/// Scan the attached devices for the first one carrying the sample stream
pub fn find_device<H: UsbHost>(
    host: &mut H,
    filter: &DeviceFilter,
) -> Option<(H::Device, StreamTarget)> {
    let devices = match host.devices() {
        Ok(devices) => devices,
        Err(e) => {
            warn!("Failed to enumerate USB devices: {}", e);
            return None;
        }
    };

    for device in devices {
        let description = match host.describe(&device) {
            Ok(d) => d,
            Err(e) => {
                debug!("Skipping device without readable descriptors: {}", e);
                continue;
            }
        };

        if let Some(target) = description.find_target(filter) {
            info!(
                "Found {:04x}:{:04x} on bus {} address {}",
                description.vendor_id, description.product_id, description.bus, description.address
            );
            return Some((device, target));
        }
    }
    None
}

/// Start the session manager on its own thread
pub fn spawn_session<H>(host: H, context: ScopeContext) -> std::io::Result<thread::JoinHandle<()>>
where
    H: UsbHost + 'static,
{
    thread::Builder::new()
        .name("usb-session".to_string())
        .spawn(move || SessionManager::new(host, context).run())
}
