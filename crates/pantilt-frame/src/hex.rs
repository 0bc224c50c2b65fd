//! Hex formatting for logs and captures.

use std::fmt;

/// Lazily formats bytes as `3C 80 5C`; cheap to pass into `tracing` fields.
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Format bytes as space-separated uppercase hex.
pub fn hex_dump(bytes: &[u8]) -> String {
    HexDump(bytes).to_string()
}

/// Parse capture notation: `"3C 80 5C"`, `"0x3C 0x80"` or `"3C805C"`.
///
/// Returns `None` on any non-hex digit or an odd digit count.
pub fn parse_hex(input: &str) -> Option<Vec<u8>> {
    let digits: String = input
        .split_whitespace()
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect();

    if digits.len() % 2 != 0 {
        return None;
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}
