use crate::core::{CaptureSnapshot, CaptureState, MAX_CHANNELS};
use crate::decode::frame::Frame;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Applies device frames to the shared capture state.
///
/// Cloning a `Decoder` yields another handle to the same state; the session
/// thread writes through one handle while the renderer reads through another.
/// Every access takes the same lock, and one frame is applied as a single
/// transition while holding it.
#[derive(Clone, Default)]
pub struct Decoder {
    state: Arc<Mutex<CaptureState>>,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        // A panic in a reader must not stop the capture
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Classify one received frame and apply its effect. Frames that cannot
    /// be applied are dropped without touching the state.
    pub fn apply(&self, bytes: &[u8]) {
        let frame = Frame::parse(bytes);
        trace!("Received {} frame ({} bytes)", frame.kind(), bytes.len());

        let mut state = self.lock();
        apply_frame(&mut state, frame);
    }

    /// Copy the render-facing part of the state
    pub fn snapshot(&self) -> CaptureSnapshot {
        self.lock().snapshot()
    }

    /// Mark a pending autofit request as handled. Returns true when a
    /// request was pending.
    pub fn consume_autofit(&self) -> bool {
        self.lock().consume_autofit()
    }

    /// Let the next autofit trigger through again
    pub fn rearm_autofit(&self) -> bool {
        self.lock().rearm_autofit()
    }

    /// Run `f` with the state locked
    #[cfg(test)]
    pub fn with_state<R>(&self, f: impl FnOnce(&CaptureState) -> R) -> R {
        f(&self.lock())
    }
}

fn apply_frame(state: &mut CaptureState, frame: Frame) {
    match frame {
        Frame::Preamble(p) => {
            let accepted = state.begin_capture(
                usize::from(p.channel_count),
                usize::from(p.depth),
                p.nominal_frequency,
                p.trigger_offset,
            );
            if accepted {
                debug!(
                    "New capture: type {} with {} channels, depth {}, {} Hz, trigger offset {}, {} columns per transfer",
                    p.kind,
                    p.channel_count,
                    p.depth,
                    p.nominal_frequency,
                    p.trigger_offset,
                    state.columns_per_transfer
                );
            } else {
                debug!(
                    "Dropping preamble with {} channels (max {})",
                    p.channel_count, MAX_CHANNELS
                );
            }
        }
        Frame::ChannelDescriptor(d) => {
            if state.describe_channel(usize::from(d.index), d.unit, &d.name, d.scale) {
                debug!(
                    "Channel {}: {:?} unit {} scale {}",
                    d.index,
                    d.name,
                    d.unit.label(),
                    d.scale
                );
            } else {
                debug!("Dropping descriptor for out-of-range channel {}", d.index);
            }
        }
        Frame::Autofit => {
            if state.request_autofit() {
                debug!("Autofit requested");
            }
        }
        Frame::Data(samples) => {
            let pushed = state.push_transfer(&samples);
            if pushed > 0 && state.is_complete() {
                debug!("Capture complete at depth {}", state.depth);
            }
        }
        Frame::Unknown(len) => {
            debug!("Dropping frame of unknown length {}", len);
        }
    }
}
