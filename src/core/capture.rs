use crate::core::channel::{Channel, Unit};

/// Number of channel slots the device can address
pub const MAX_CHANNELS: usize = 32;

/// Number of 16-bit samples carried by one data frame
pub const SAMPLES_PER_TRANSFER: usize = 32;

/// One-shot latch asking the renderer to rescale its axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutofitState {
    #[default]
    Idle,
    Requested,
    Consumed,
}

/// Shared capture store: channel metadata, axis grouping and sample buffers
/// for the capture currently being streamed.
#[derive(Debug, Clone)]
pub struct CaptureState {
    /// Target sample count per channel
    pub depth: usize,
    pub active_channel_count: usize,
    /// Samples per channel in one data frame, fixed until the next preamble
    pub columns_per_transfer: usize,
    /// Sample rate in Hz, only used to label the time axis
    pub nominal_frequency: u32,
    /// Pre-trigger sample count, only used to label the time axis
    pub trigger_offset: u16,
    /// Distinct unit labels in first-seen order
    pub axis_labels: Vec<String>,
    pub autofit: AutofitState,
    channels: [Channel; MAX_CHANNELS],
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureState {
    pub fn new() -> Self {
        Self {
            depth: 0,
            active_channel_count: 0,
            columns_per_transfer: 0,
            nominal_frequency: 0,
            trigger_offset: 0,
            axis_labels: Vec::new(),
            autofit: AutofitState::Idle,
            channels: std::array::from_fn(|_| Channel::default()),
        }
    }

    /// Start a new capture. Returns false (and changes nothing) when the
    /// channel count exceeds the slot capacity.
    pub fn begin_capture(
        &mut self,
        channel_count: usize,
        depth: usize,
        nominal_frequency: u32,
        trigger_offset: u16,
    ) -> bool {
        if channel_count > MAX_CHANNELS {
            return false;
        }

        self.active_channel_count = channel_count;
        self.depth = depth;
        self.nominal_frequency = nominal_frequency;
        self.trigger_offset = trigger_offset;
        self.columns_per_transfer = if channel_count == 0 {
            0
        } else {
            SAMPLES_PER_TRANSFER / channel_count
        };

        for channel in self.channels.iter_mut() {
            channel.reset(depth);
        }
        self.axis_labels.clear();
        true
    }

    /// Apply a channel descriptor. Out-of-range indices are ignored and
    /// reported with `false`.
    pub fn describe_channel(&mut self, index: usize, unit: Unit, name: &str, scale: f32) -> bool {
        if index >= MAX_CHANNELS {
            return false;
        }

        let axis_index = self.axis_for(unit.label());
        self.channels[index].describe(name, unit, scale, axis_index);
        true
    }

    /// Position of `label` in the axis list, appending it when unseen
    fn axis_for(&mut self, label: &str) -> usize {
        match self.axis_labels.iter().position(|l| l == label) {
            Some(pos) => pos,
            None => {
                self.axis_labels.push(label.to_string());
                self.axis_labels.len() - 1
            }
        }
    }

    /// Idle -> Requested. Any other state is left alone.
    pub fn request_autofit(&mut self) -> bool {
        if self.autofit == AutofitState::Idle {
            self.autofit = AutofitState::Requested;
            true
        } else {
            false
        }
    }

    /// Requested -> Consumed, called by the renderer once it has refit.
    pub fn consume_autofit(&mut self) -> bool {
        if self.autofit == AutofitState::Requested {
            self.autofit = AutofitState::Consumed;
            true
        } else {
            false
        }
    }

    /// Consumed -> Idle, so the next trigger frame is accepted again.
    pub fn rearm_autofit(&mut self) -> bool {
        if self.autofit == AutofitState::Consumed {
            self.autofit = AutofitState::Idle;
            true
        } else {
            false
        }
    }

    /// Distribute one data frame over the active channels. Samples are
    /// column-major: every column holds one sample per active channel in
    /// index order. Returns how many samples were stored.
    pub fn push_transfer(&mut self, raw: &[i16]) -> usize {
        let active = self.active_channel_count;
        let depth = self.depth;
        let mut stored = 0;

        for column in 0..self.columns_per_transfer {
            for (ch, channel) in self.channels[..active].iter_mut().enumerate() {
                let Some(&sample) = raw.get(column * active + ch) else {
                    return stored;
                };
                if channel.push_raw(sample, depth) {
                    stored += 1;
                }
            }
        }
        stored
    }

    #[cfg(test)]
    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    /// Channels carrying data in the current capture
    pub fn active_channels(&self) -> &[Channel] {
        &self.channels[..self.active_channel_count]
    }

    /// Every channel slot, including unused ones
    #[cfg(test)]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Whether every active channel has reached the capture depth
    pub fn is_complete(&self) -> bool {
        self.active_channel_count > 0
            && self.active_channels().iter().all(|c| c.is_full(self.depth))
    }

    /// Owned copy of everything the renderer needs
    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            depth: self.depth,
            trigger_offset: self.trigger_offset,
            nominal_frequency: self.nominal_frequency,
            axis_labels: self.axis_labels.clone(),
            traces: self
                .active_channels()
                .iter()
                .map(|c| TraceSnapshot {
                    display_name: c.display_name.clone(),
                    axis_index: c.axis_index,
                    samples: c.samples.clone(),
                })
                .collect(),
            autofit: self.autofit,
        }
    }
}

fn time_of(sample_index: usize, trigger_offset: u16, nominal_frequency: u32) -> f64 {
    if nominal_frequency == 0 {
        return 0.0;
    }
    (sample_index as f64 - f64::from(trigger_offset)) / f64::from(nominal_frequency)
}

/// Render-facing copy of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSnapshot {
    pub display_name: String,
    /// None for a channel not yet described in this capture
    pub axis_index: Option<usize>,
    pub samples: Vec<f32>,
}

/// Render-facing copy of the capture, taken under the lock
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureSnapshot {
    pub depth: usize,
    pub trigger_offset: u16,
    pub nominal_frequency: u32,
    pub axis_labels: Vec<String>,
    pub traces: Vec<TraceSnapshot>,
    pub autofit: AutofitState,
}

impl CaptureSnapshot {
    pub fn time_of(&self, sample_index: usize) -> f64 {
        time_of(sample_index, self.trigger_offset, self.nominal_frequency)
    }

    /// Traces plotted against the given axis
    pub fn traces_on_axis(&self, axis: usize) -> impl Iterator<Item = (usize, &TraceSnapshot)> {
        self.traces
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.axis_index == Some(axis))
    }
}
