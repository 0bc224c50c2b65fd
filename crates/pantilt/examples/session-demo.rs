//! Connect to a pan-tilt unit, keep it alive and sweep both axes.
//!
//! Run with:
//!   cargo run --example session-demo --features logging -- /dev/ttyUSB0 [config.json]
//!
//! Without a config file the observed defaults are used, with
//! `proceed_without_ack` enabled since the unit rarely answers initialize.

use std::thread;
use std::time::Duration;

use pantilt::command::Axis;
use pantilt::config::PantiltConfig;
use pantilt::logging::init_logging;
use pantilt::session::{KeepaliveHandle, MoveOutcome};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let device = args
        .next()
        .ok_or("usage: session-demo <device> [config.json]")?;
    let config = match args.next() {
        Some(path) => PantiltConfig::load(path)?,
        None => {
            let mut config = PantiltConfig::default();
            config.session.proceed_without_ack = true;
            config
        }
    };
    init_logging(&config.log);

    let session = pantilt::open_session(&device, &config)?;
    let keepalive = KeepaliveHandle::spawn(session)?;
    eprintln!("Session ready on {device}");

    for (axis, angle) in [
        (Axis::Pan, 0),
        (Axis::Pan, 90),
        (Axis::Tilt, 30),
        (Axis::Pan, 180),
        (Axis::Tilt, 0),
    ] {
        match keepalive.move_to(axis, angle)? {
            MoveOutcome::Acknowledged(frame) => {
                eprintln!("{axis} -> {angle}: acknowledged ({} bytes)", frame.wire_size())
            }
            MoveOutcome::TimedOut => eprintln!("{axis} -> {angle}: no ack"),
        }
        thread::sleep(Duration::from_secs(2));
    }

    let stats = keepalive.stats();
    if let Some(session) = keepalive.shutdown() {
        for entry in session.transcript().entries().take(8) {
            eprintln!("{entry}");
        }
    }
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
