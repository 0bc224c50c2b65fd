use std::time::Duration;

use crate::error::Result;

/// Byte-level access to an open serial line.
///
/// Implementations own the line exclusively. Callers serialize access; the
/// trait is not expected to be shared between concurrent writers.
pub trait SerialTransport: Send {
    /// Write bytes to the line, returning how many were accepted.
    ///
    /// A short count is not an error; callers loop until the frame is out.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Read whatever arrives within `max_wait`.
    ///
    /// Returns an empty vector on timeout. Must never block past `max_wait`.
    fn read(&mut self, max_wait: Duration) -> Result<Vec<u8>>;

    /// Discard bytes that arrived but have not been read yet.
    ///
    /// Returns the number of bytes dropped when the driver reports it.
    fn clear_input(&mut self) -> Result<usize>;

    /// Release the line. Further calls fail with `TransportError::Closed`.
    fn close(&mut self) -> Result<()>;
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        (**self).write(bytes)
    }

    fn read(&mut self, max_wait: Duration) -> Result<Vec<u8>> {
        (**self).read(max_wait)
    }

    fn clear_input(&mut self) -> Result<usize> {
        (**self).clear_input()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}
