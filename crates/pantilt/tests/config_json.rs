use std::time::Duration;

use pantilt::config::{ConfigError, LogLevel, PantiltConfig};
use pantilt::transport::{Parity, StopBits};

#[test]
fn full_document_parses() {
    let json = r#"{
        "serial": {
            "baud_rate": 9600,
            "parity": "none",
            "stop_bits": "one",
            "read_timeout": 250,
            "dtr": true,
            "pacing": { "byte_delay": 5, "start_marker_delay": 20, "escape_delay": 10, "settle": 20 }
        },
        "session": {
            "init_policy": [5000, 10000, 30000],
            "proceed_without_ack": true,
            "heartbeat_interval": 1000,
            "move_ack": "standard"
        },
        "log": { "level": "debug" }
    }"#;

    let config = PantiltConfig::from_json_str(json).unwrap();
    assert_eq!(config.serial.parity, Parity::None);
    assert_eq!(config.serial.stop_bits, StopBits::One);
    assert_eq!(config.serial.read_timeout, Duration::from_millis(250));
    assert!(config.serial.dtr);
    assert!(config.serial.pacing.is_some());
    assert_eq!(config.log.level, LogLevel::Debug);

    #[cfg(feature = "session")]
    {
        assert_eq!(config.session.init_policy.attempts(), 3);
        assert_eq!(
            config.session.move_ack.timeout(),
            Duration::from_secs(10)
        );
    }

    let again = PantiltConfig::from_json_str(&config.to_json_pretty().unwrap()).unwrap();
    assert_eq!(again, config);
}

#[test]
fn load_reads_file() {
    let path = std::env::temp_dir().join(format!("pantilt-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"serial": {"baud_rate": 4800}}"#).unwrap();

    let config = PantiltConfig::load(&path).unwrap();
    assert_eq!(config.serial.baud_rate, 4800);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn unknown_enum_value_is_a_json_error() {
    assert!(matches!(
        PantiltConfig::from_json_str(r#"{"serial": {"parity": "mark"}}"#),
        Err(ConfigError::Json(_))
    ));
}
