pub mod capture;
pub mod channel;

pub use capture::{AutofitState, CaptureSnapshot, CaptureState, MAX_CHANNELS, SAMPLES_PER_TRANSFER};
pub use channel::Unit;
