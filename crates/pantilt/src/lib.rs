//! Serial control of a motorized pan-tilt unit.
//!
//! The unit speaks a marker-delimited binary protocol over RS-232. It must
//! be initialized, kept alive with a heartbeat every second, and can then be
//! sent absolute pan and tilt angles.
//!
//! # Crate Structure
//!
//! - [`transport`] — Serial line access and the `SerialTransport` trait
//! - [`frame`] — Frame encoding, decoding and stream reassembly
//! - [`command`] — Semantic commands and their byte templates
//! - [`session`] — Session state machine and keepalive worker (behind `session` feature)
//! - [`config`] — Combined JSON configuration
//!
//! ```no_run
//! # #[cfg(feature = "session")]
//! # fn main() -> Result<(), pantilt::Error> {
//! use pantilt::command::Axis;
//! use pantilt::config::PantiltConfig;
//!
//! let config = PantiltConfig::default();
//! let mut session = pantilt::open_session("/dev/ttyUSB0", &config)?;
//! session.move_to(Axis::Pan, 90)?;
//! session.run_for(std::time::Duration::from_secs(5))?;
//! session.disconnect()?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "session"))]
//! # fn main() {}
//! ```

pub mod config;
#[cfg(feature = "logging")]
pub mod logging;

/// Re-export transport types.
pub mod transport {
    pub use pantilt_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pantilt_frame::*;
}

/// Re-export command types.
pub mod command {
    pub use pantilt_command::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use pantilt_session::*;
}

#[cfg(feature = "session")]
pub use open::{open_session, Error};

#[cfg(feature = "session")]
mod open {
    use pantilt_session::{Session, SessionError};
    use pantilt_transport::{SerialPortTransport, TransportError};
    use tracing::info;

    use crate::config::{ConfigError, PantiltConfig};

    /// Errors from [`open_session`].
    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        #[error(transparent)]
        Config(#[from] ConfigError),

        #[error(transparent)]
        Transport(#[from] TransportError),

        #[error(transparent)]
        Session(#[from] SessionError),
    }

    /// Open the serial device at `path` and initialize a session on it.
    ///
    /// Returns once the session is `Ready`; the caller keeps it serviced with
    /// `poll`/`run_for` or hands it to a `KeepaliveHandle`.
    pub fn open_session(
        path: &str,
        config: &PantiltConfig,
    ) -> Result<Session<SerialPortTransport>, Error> {
        config.validate()?;
        let transport = SerialPortTransport::open(path, &config.serial)?;
        let mut session = Session::new(config.session.clone())?;
        session.connect(transport)?;
        info!(%path, "pan-tilt session ready");
        Ok(session)
    }
}
