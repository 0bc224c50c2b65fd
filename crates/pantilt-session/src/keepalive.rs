use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use pantilt_command::{Axis, Command};
use pantilt_frame::Frame;
use pantilt_transport::{SerialTransport, TransportError};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SessionError};
use crate::session::{MoveOutcome, Session, SessionStats};
use crate::state::SessionState;

const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Keeps a ready session's heartbeat going from a background thread.
///
/// The session sits behind a mutex. The worker takes the lock only for the
/// duration of one heartbeat cycle, and every operation on the handle takes
/// the same lock, so frames still leave in the order they were requested.
pub struct KeepaliveHandle<T, C = SystemClock>
where
    T: SerialTransport + 'static,
    C: Clock + 'static,
{
    session: Arc<Mutex<Session<T, C>>>,
    cancel: CancelToken,
    stop: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl<T, C> KeepaliveHandle<T, C>
where
    T: SerialTransport + 'static,
    C: Clock + 'static,
{
    /// Start the heartbeat worker for a `Ready` session.
    pub fn spawn(session: Session<T, C>) -> Result<Self> {
        if session.state() != SessionState::Ready {
            return Err(SessionError::InvalidState {
                operation: "start keepalive",
                state: session.state(),
            });
        }

        let cancel = session.cancel_token();
        let session = Arc::new(Mutex::new(session));
        let (stop_tx, stop_rx) = mpsc::channel();

        let shared = Arc::clone(&session);
        let worker = thread::Builder::new()
            .name("pantilt-keepalive".to_string())
            .spawn(move || run_worker(&shared, &stop_rx))
            .map_err(|err| SessionError::Transport(TransportError::Io(err)))?;
        info!("keepalive worker started");

        Ok(Self {
            session,
            cancel,
            stop: Some(stop_tx),
            worker: Some(worker),
        })
    }

    pub fn move_to(&self, axis: Axis, angle_degrees: i32) -> Result<MoveOutcome> {
        self.lock().move_to(axis, angle_degrees)
    }

    pub fn request(&self, command: Command) -> Result<Frame> {
        self.lock().request(command)
    }

    pub fn request_with_timeout(&self, command: Command, timeout: Duration) -> Result<Frame> {
        self.lock().request_with_timeout(command, timeout)
    }

    pub fn state(&self) -> SessionState {
        self.lock().state()
    }

    pub fn stats(&self) -> SessionStats {
        self.lock().stats()
    }

    /// Run `f` with exclusive access to the session.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session<T, C>) -> R) -> R {
        f(&mut self.lock())
    }

    /// Whether the worker thread is still running.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Abort in-flight waits, stop the worker and close the line.
    ///
    /// Returns the session for inspection. A session that failed while the
    /// worker ran is returned as-is, still `Failed`.
    pub fn shutdown(mut self) -> Option<Session<T, C>> {
        self.stop_worker();
        let shared = Arc::clone(&self.session);
        drop(self);

        let mut session = match Arc::try_unwrap(shared) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(_) => return None,
        };
        if !session.state().is_failed() {
            if let Err(err) = session.disconnect() {
                warn!(error = %err, "disconnect after keepalive stop failed");
            }
        }
        Some(session)
    }

    fn stop_worker(&mut self) {
        self.cancel.cancel();
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("keepalive worker panicked");
            }
            debug!("keepalive worker stopped");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session<T, C>> {
        lock(&self.session)
    }
}

impl<T, C> Drop for KeepaliveHandle<T, C>
where
    T: SerialTransport + 'static,
    C: Clock + 'static,
{
    fn drop(&mut self) {
        self.stop_worker();
    }
}

fn lock<S>(mutex: &Mutex<S>) -> MutexGuard<'_, S> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_worker<T: SerialTransport, C: Clock>(
    session: &Mutex<Session<T, C>>,
    stop: &mpsc::Receiver<()>,
) {
    loop {
        let wait = {
            let mut session = lock(session);
            if !session.state().is_active() {
                debug!(state = %session.state(), "keepalive worker exiting");
                return;
            }
            if let Err(err) = session.heartbeat_if_due() {
                warn!(error = %err, state = %session.state(), "keepalive worker exiting");
                return;
            }
            session.time_until_heartbeat().unwrap_or(IDLE_WAIT)
        };

        match stop.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
