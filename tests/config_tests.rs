//! Config file loading

use std::io::Write;
use switchboard::config::{Config, ConfigError, StoreBackend};
use tempfile::{tempdir, NamedTempFile};

#[test]
fn test_missing_file_gives_defaults() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = Config::load_from(&dir.path().join("absent.toml"))?;

    assert_eq!(config.server.addr().to_string(), "127.0.0.1:8000");
    assert_eq!(config.hub.max_message_bytes, 64 * 1024);
    assert_eq!(config.store.backend, StoreBackend::Rest);
    Ok(())
}

#[test]
fn test_full_file_is_loaded() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"
[server]
bind = "0.0.0.0"
port = 9100

[hub]
send_buffer = 8
send_timeout_ms = 250
max_message_bytes = 1024

[store]
backend = "rest"
url = "https://db.example.com"
key = "service-key"
request_timeout_secs = 3
"#
    )?;

    let config = Config::load_from(file.path())?;
    assert_eq!(config.server.addr().to_string(), "0.0.0.0:9100");

    let policy = config.hub.send_policy();
    assert_eq!(policy.queue_capacity, 8);
    assert_eq!(policy.send_timeout.as_millis(), 250);
    assert_eq!(config.hub.max_message_bytes, 1024);

    assert_eq!(config.store.url.as_deref(), Some("https://db.example.com"));
    assert!(config.store.key.is_some());
    assert!(config.store.missing().is_empty());
    assert_eq!(config.store.request_timeout().as_secs(), 3);
    Ok(())
}

#[test]
fn test_invalid_toml_is_parse_error() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "[server\nport = \"not a number\"")?;

    match Config::load_from(file.path()) {
        Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_unknown_backend_is_parse_error() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "[store]\nbackend = \"sqlite\"")?;

    assert!(matches!(
        Config::load_from(file.path()),
        Err(ConfigError::Parse { .. })
    ));
    Ok(())
}

#[test]
fn test_zero_send_buffer_is_clamped() -> anyhow::Result<()> {
    let config = Config::parse("[hub]\nsend_buffer = 0\n")?;
    assert_eq!(config.hub.send_policy().queue_capacity, 1);
    Ok(())
}
