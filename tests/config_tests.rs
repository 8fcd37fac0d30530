// Tests for configuration loading and the derived session settings
//
// These verify the defaults, the environment overrides, and the URL the
// session builds for the live endpoint.

use std::time::Duration;

use anyhow::Result;
use streamscribe::{Config, SessionConfig, DEFAULT_OPEN_TIMEOUT, KEEPALIVE_INTERVAL};

#[test]
fn test_session_defaults() {
    let config = SessionConfig::default();

    assert_eq!(config.endpoint, "wss://api.deepgram.com/v1/listen");
    assert_eq!(config.model, "nova-2");
    assert_eq!(config.language, "en-US");
    assert!(config.smart_format);
    assert!(config.interim_results);
    assert_eq!(config.endpointing_ms, 200);
    assert_eq!(config.encoding, "linear16");
    assert_eq!(config.sample_rate, 16000);
    assert_eq!(config.keepalive_interval, KEEPALIVE_INTERVAL);
    assert!(config.api_key.is_empty(), "No credential should be baked in");
    assert!(config.session_id.starts_with("live-"));
}

#[test]
fn test_session_ids_are_unique() {
    let first = SessionConfig::default();
    let second = SessionConfig::default();
    assert_ne!(first.session_id, second.session_id);
}

#[test]
fn test_timing_constants() {
    assert_eq!(KEEPALIVE_INTERVAL, Duration::from_secs(5));
    assert_eq!(DEFAULT_OPEN_TIMEOUT, Duration::from_secs(8));
}

#[test]
fn test_stream_url_carries_all_options() {
    let config = SessionConfig {
        api_key: "secret-key".to_string(),
        ..SessionConfig::default()
    };
    let url = config.stream_url();

    assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
    assert!(url.contains("model=nova-2"));
    assert!(url.contains("language=en-US"));
    assert!(url.contains("smart_format=true"));
    assert!(url.contains("interim_results=true"));
    assert!(url.contains("endpointing=200"));
    assert!(url.contains("encoding=linear16"));
    assert!(url.contains("sample_rate=16000"));
    assert!(
        !url.contains("secret-key"),
        "The credential must never appear in the URL: {}",
        url
    );
}

#[test]
fn test_app_config_defaults() {
    let config = Config::default();

    assert_eq!(config.api.endpoint, "wss://api.deepgram.com/v1/listen");
    assert!(config.api.key.is_empty());
    assert_eq!(config.stream.model, "nova-2");
    assert_eq!(config.stream.endpointing_ms, 200);
    assert!(config.capture.echo_cancellation);
    assert!(config.capture.noise_suppression);
    assert_eq!(config.capture.sample_rate, 16000);
    assert_eq!(config.capture.chunk_ms, 100);
}

#[test]
fn test_load_without_file_uses_defaults() -> Result<()> {
    // Assert only fields no environment variable overrides, so this test
    // cannot race with the override test below
    let config = Config::load(None)?;
    assert!(config.stream.smart_format);
    assert!(config.stream.interim_results);
    assert_eq!(config.stream.endpointing_ms, 200);
    assert_eq!(config.capture.chunk_ms, 100);
    Ok(())
}

#[test]
fn test_env_overrides_apply() {
    std::env::set_var("STREAMSCRIBE_API_KEY", "env-key");
    std::env::set_var("STREAMSCRIBE_MODEL", "nova-3");

    let config = Config::default().with_env_overrides();
    assert_eq!(config.api.key, "env-key");
    assert_eq!(config.stream.model, "nova-3");

    std::env::remove_var("STREAMSCRIBE_API_KEY");
    std::env::remove_var("STREAMSCRIBE_MODEL");
}

#[test]
fn test_session_config_bridges_app_config() {
    let mut config = Config::default();
    config.api.key = "bridge-key".to_string();
    config.stream.language = "de".to_string();

    let session = config.session_config();
    assert_eq!(session.api_key, "bridge-key");
    assert_eq!(session.language, "de");
    assert_eq!(session.endpoint, config.api.endpoint);
    assert_eq!(session.sample_rate, config.stream.sample_rate);
}

#[test]
fn test_capture_constraints_bridge_app_config() {
    let mut config = Config::default();
    config.capture.echo_cancellation = false;
    config.capture.sample_rate = 8000;

    let constraints = config.capture_constraints();
    assert!(!constraints.echo_cancellation);
    assert!(constraints.noise_suppression);
    assert_eq!(constraints.sample_rate, 8000);
}
