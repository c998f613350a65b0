/// Physical unit reported by a channel descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Channel slot is not in use
    Off,
    /// Dimensionless value
    Generic,
    Voltage,
    Current,
    Temperature,
    /// Code outside the known set
    Unknown(u8),
}

impl Unit {
    /// Map a wire unit code to a unit
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Unit::Off,
            1 => Unit::Generic,
            2 => Unit::Voltage,
            3 => Unit::Current,
            4 => Unit::Temperature,
            other => Unit::Unknown(other),
        }
    }

    /// Short label used for axis grouping and display
    pub fn label(&self) -> &'static str {
        match self {
            Unit::Off => "off",
            Unit::Generic => "1",
            Unit::Voltage => "V",
            Unit::Current => "A",
            Unit::Temperature => "°",
            Unit::Unknown(_) => "?",
        }
    }
}

/// One physical signal trace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    /// Device-supplied name with the unit label appended
    pub display_name: String,
    pub unit_label: String,
    /// Multiplier applied to raw integer samples
    pub scale: f32,
    /// Index into the capture's axis list. None until the channel has been
    /// described in the current capture.
    pub axis_index: Option<usize>,
    pub samples: Vec<f32>,
}

impl Channel {
    /// Drop all samples and the axis assignment, and reserve room for a
    /// capture of `depth` samples. Name and scale are kept.
    pub fn reset(&mut self, depth: usize) {
        self.axis_index = None;
        self.samples.clear();
        self.samples.reserve(depth);
    }

    /// Overwrite the channel metadata from a descriptor
    pub fn describe(&mut self, name: &str, unit: Unit, scale: f32, axis_index: usize) {
        self.display_name = format!("{} ({})", name, unit.label());
        self.unit_label = unit.label().to_string();
        self.scale = scale;
        self.axis_index = Some(axis_index);
    }

    /// Scale and append one raw sample unless the capture depth is reached.
    /// Returns false when the sample was dropped.
    pub fn push_raw(&mut self, raw: i16, depth: usize) -> bool {
        if self.samples.len() >= depth {
            return false;
        }
        self.samples.push(f32::from(raw) * self.scale);
        true
    }

    pub fn is_full(&self, depth: usize) -> bool {
        self.samples.len() >= depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_labels() {
        assert_eq!(Unit::from_code(0).label(), "off");
        assert_eq!(Unit::from_code(1).label(), "1");
        assert_eq!(Unit::from_code(2).label(), "V");
        assert_eq!(Unit::from_code(3).label(), "A");
        assert_eq!(Unit::from_code(4).label(), "°");
        assert_eq!(Unit::from_code(5), Unit::Unknown(5));
        assert_eq!(Unit::from_code(200).label(), "?");
    }

    #[test]
    fn test_describe_builds_display_name() {
        let mut ch = Channel::default();
        ch.describe("VBUS", Unit::Voltage, 0.001, 2);
        assert_eq!(ch.display_name, "VBUS (V)");
        assert_eq!(ch.unit_label, "V");
        assert_eq!(ch.scale, 0.001);
        assert_eq!(ch.axis_index, Some(2));
    }

    #[test]
    fn test_push_raw_respects_depth() {
        let mut ch = Channel::default();
        ch.describe("I", Unit::Current, 0.5, 0);
        ch.reset(2);

        assert!(ch.push_raw(4, 2));
        assert!(ch.push_raw(-6, 2));
        assert!(!ch.push_raw(8, 2));
        assert!(ch.is_full(2));
        assert_eq!(ch.samples, vec![2.0f32, -3.0]);
    }

    #[test]
    fn test_reset_keeps_name_and_scale() {
        let mut ch = Channel::default();
        ch.describe("T", Unit::Temperature, 1.0, 1);
        ch.push_raw(10, 8);
        ch.reset(8);
        assert!(ch.samples.is_empty());
        assert!(ch.samples.capacity() >= 8);
        assert_eq!(ch.display_name, "T (°)");
        assert_eq!(ch.scale, 1.0);
        assert_eq!(ch.axis_index, None);
    }
}
