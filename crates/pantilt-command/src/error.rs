/// Errors that can occur while building command payloads.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The angle does not fit the single-byte magnitude field.
    #[error("invalid angle {angle} (expected 0..={max})")]
    InvalidAngle { angle: i32, max: u8 },

    /// The payload could not be framed.
    #[error("frame error: {0}")]
    Frame(#[from] pantilt_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, CommandError>;
