//! Serial line transport for the pan-tilt control protocol.
//!
//! This is the lowest layer of the workspace. It opens and configures the
//! physical line (baud rate, parity, stop bits, flow control, control lines)
//! and moves raw bytes in both directions with a bounded read wait.
//!
//! Everything above this crate talks to the line through the
//! [`SerialTransport`] trait, so sessions can be driven by the real
//! [`SerialPortTransport`] or by an in-memory double in tests.

pub mod config;
pub mod duration_ms;
pub mod error;
pub mod serial;
pub mod traits;

pub use config::{FlowControl, Parity, SerialConfig, StopBits, WritePacing};
pub use error::{Result, TransportError};
pub use serial::SerialPortTransport;
pub use traits::SerialTransport;
