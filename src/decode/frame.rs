use crate::core::{Unit, SAMPLES_PER_TRANSFER};

/// Size of the preamble header: u8, u8, u16, u32, u16 naturally aligned
/// and padded to a 4-byte boundary.
pub const PREAMBLE_LEN: usize = 12;

/// Size of the channel descriptor: u8, u8, 14-byte name, f32.
pub const DESCRIPTOR_LEN: usize = 20;

pub const AUTOFIT_LEN: usize = 1;

/// 32 signed 16-bit samples
pub const DATA_LEN: usize = SAMPLES_PER_TRANSFER * 2;

/// Width of the fixed name buffer in a channel descriptor
pub const NAME_LEN: usize = 14;

/// Capture shape announced before a capture starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preamble {
    /// Leading type byte, carried through for logging only
    pub kind: u8,
    pub channel_count: u8,
    pub depth: u16,
    pub nominal_frequency: u32,
    pub trigger_offset: u16,
}

/// Metadata for one channel slot
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    pub index: u8,
    pub unit: Unit,
    pub name: String,
    pub scale: f32,
}

/// One transport frame, classified by its exact length
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Preamble(Preamble),
    ChannelDescriptor(ChannelDescriptor),
    Autofit,
    Data([i16; SAMPLES_PER_TRANSFER]),
    /// Length matched no known frame kind
    Unknown(usize),
}

impl Frame {
    /// Classify and decode a frame. Multi-byte fields are little-endian.
    pub fn parse(bytes: &[u8]) -> Self {
        match bytes.len() {
            PREAMBLE_LEN => Frame::Preamble(Preamble {
                kind: bytes[0],
                channel_count: bytes[1],
                depth: read_u16(bytes, 2),
                nominal_frequency: read_u32(bytes, 4),
                trigger_offset: read_u16(bytes, 8),
            }),
            DESCRIPTOR_LEN => Frame::ChannelDescriptor(ChannelDescriptor {
                index: bytes[0],
                unit: Unit::from_code(bytes[1]),
                name: read_name(&bytes[2..2 + NAME_LEN]),
                scale: f32::from_bits(read_u32(bytes, 16)),
            }),
            AUTOFIT_LEN => Frame::Autofit,
            DATA_LEN => {
                let mut samples = [0i16; SAMPLES_PER_TRANSFER];
                for (i, sample) in samples.iter_mut().enumerate() {
                    *sample = read_u16(bytes, i * 2) as i16;
                }
                Frame::Data(samples)
            }
            other => Frame::Unknown(other),
        }
    }

    /// Short name for log output
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Preamble(_) => "preamble",
            Frame::ChannelDescriptor(_) => "channel descriptor",
            Frame::Autofit => "autofit",
            Frame::Data(_) => "data",
            Frame::Unknown(_) => "unknown",
        }
    }
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Fixed-width, NUL-padded name buffer to a string
fn read_name(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).trim_end().to_string()
}
