use crate::context::DEFAULT_BACKOFF;
use crate::hardware::DeviceFilter;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Live plot of analog samples streamed from a USB capture device
#[derive(Parser, Debug)]
#[command(name = "usbscope")]
#[command(version, about, long_about = None)]
pub struct ScopeArgs {
    /// USB vendor ID (e.g. 0x6666)
    #[arg(value_parser = parse_u16)]
    pub vendor_id: u16,

    /// USB product ID
    #[arg(value_parser = parse_u16)]
    pub product_id: u16,

    /// Subclass of the vendor-specific interface carrying the samples
    #[arg(value_parser = parse_u8)]
    pub subclass: u8,

    /// Delay before rescanning after a missing device or a lost session
    #[arg(long, default_value_t = DEFAULT_BACKOFF.as_millis() as u64)]
    pub backoff_ms: u64,
}

impl ScopeArgs {
    pub fn filter(&self) -> DeviceFilter {
        DeviceFilter {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            subclass: self.subclass,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Parse an integer literal: `0x`/`0X` hex, `0o` octal, `0b` binary or decimal
pub fn parse_int(s: &str) -> Result<u64, String> {
    let s = s.trim().replace('_', "");
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(oct) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        (oct, 8)
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (bin, 2)
    } else {
        (s.as_str(), 10)
    };

    u64::from_str_radix(digits, radix).map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let v = parse_int(s)?;
    u16::try_from(v).map_err(|_| format!("{} does not fit in 16 bits", v))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let v = parse_int(s)?;
    u8::try_from(v).map_err(|_| format!("{} does not fit in 8 bits", v))
}

/// Persistent UI preferences. Captured data is never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub window_width: f64,
    pub window_height: f64,
    /// Re-arm the autofit latch after every fit so each capture is fitted
    pub autofit_every_request: bool,
    pub show_legend: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            window_width: 1300.0,
            window_height: 600.0,
            autofit_every_request: true,
            show_legend: true,
        }
    }
}

impl AppSettings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("usbscope").join("settings.json"))
    }

    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        match fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                warn!("Ignoring unreadable settings {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn from_json(contents: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    warn!("Failed to save settings to {}: {}", path.display(), e);
                } else {
                    debug!("Saved settings to {}", path.display());
                }
            }
            Err(e) => warn!("Failed to serialize settings: {}", e),
        }
    }
}
