use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default line speed observed on the unit.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default driver-level read timeout for a single blocking read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

/// Byte pacing for slow receivers.
///
/// When set, frames are written one byte at a time with the given gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritePacing {
    /// Gap after each ordinary byte.
    #[serde(with = "crate::duration_ms")]
    pub byte_delay: Duration,
    /// Gap after a start marker (`0x3C`).
    #[serde(with = "crate::duration_ms")]
    pub start_marker_delay: Duration,
    /// Gap after an escape byte (`0x5C`).
    #[serde(with = "crate::duration_ms")]
    pub escape_delay: Duration,
    /// Quiet time after the last byte of a write.
    #[serde(with = "crate::duration_ms")]
    pub settle: Duration,
}

impl WritePacing {
    const START_MARKER: u8 = 0x3C;
    const ESCAPE: u8 = 0x5C;

    /// Gap to leave after writing `byte`.
    pub fn delay_after(&self, byte: u8) -> Duration {
        match byte {
            Self::START_MARKER => self.start_marker_delay,
            Self::ESCAPE => self.escape_delay,
            _ => self.byte_delay,
        }
    }
}

impl Default for WritePacing {
    fn default() -> Self {
        Self {
            byte_delay: Duration::from_millis(5),
            start_marker_delay: Duration::from_millis(20),
            escape_delay: Duration::from_millis(10),
            settle: Duration::from_millis(20),
        }
    }
}

/// Line configuration applied when the port is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Line speed in baud. Default: 9600.
    pub baud_rate: u32,
    /// Parity mode. Default: none.
    pub parity: Parity,
    /// Stop bits. Default: one.
    pub stop_bits: StopBits,
    /// Flow control. Default: none.
    pub flow_control: FlowControl,
    /// Driver read timeout for each blocking read call.
    #[serde(with = "crate::duration_ms")]
    pub read_timeout: Duration,
    /// Level driven on DTR after open. The unit expects it inactive.
    pub dtr: bool,
    /// Level driven on RTS after open. The unit expects it inactive.
    pub rts: bool,
    /// Optional per-byte write pacing.
    pub pacing: Option<WritePacing>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            dtr: false,
            rts: false,
            pacing: None,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(value: FlowControl) -> Self {
        match value {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}
