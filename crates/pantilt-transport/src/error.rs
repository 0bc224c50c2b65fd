/// Errors that can occur on the serial line.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open or configure the device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: serialport::Error,
    },

    /// The serial driver rejected a line operation (control lines, buffers).
    #[error("serial line error: {0}")]
    Serial(#[from] serialport::Error),

    /// An I/O error occurred while reading or writing bytes.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport was closed and can no longer be used.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Whether a retry of the same operation may succeed.
    ///
    /// Only write timeouts and interrupted calls qualify; everything else
    /// means the line is gone.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
