use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::audio::CaptureConstraints;
use crate::session::SessionConfig;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub stream: StreamConfig,
    pub capture: CaptureConfig,
}

/// Transcription service credentials and endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// API key for the transcription service. Usually supplied through
    /// the STREAMSCRIBE_API_KEY environment variable rather than on disk.
    pub key: String,

    /// WebSocket endpoint for live transcription
    pub endpoint: String,
}

/// Streaming transcription parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub model: String,
    pub language: String,
    pub smart_format: bool,
    pub interim_results: bool,
    pub endpointing_ms: u32,
    pub encoding: String,
    pub sample_rate: u32,
}

/// Microphone capture parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
    pub chunk_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            smart_format: true,
            interim_results: true,
            endpointing_ms: 200,
            encoding: "linear16".to_string(),
            sample_rate: 16000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            sample_rate: 16000,
            chunk_ms: 100,
        }
    }
}

impl Config {
    /// Load configuration from an optional file, then apply environment
    /// overrides. A missing file is fine; missing fields use defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder.build()?;
        let loaded: Config = settings.try_deserialize()?;

        Ok(loaded.with_env_overrides())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - STREAMSCRIBE_API_KEY → api.key
    /// - STREAMSCRIBE_ENDPOINT → api.endpoint
    /// - STREAMSCRIBE_MODEL → stream.model
    /// - STREAMSCRIBE_LANGUAGE → stream.language
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("STREAMSCRIBE_API_KEY") {
            if !key.is_empty() {
                self.api.key = key;
            }
        }

        if let Ok(endpoint) = std::env::var("STREAMSCRIBE_ENDPOINT") {
            if !endpoint.is_empty() {
                self.api.endpoint = endpoint;
            }
        }

        if let Ok(model) = std::env::var("STREAMSCRIBE_MODEL") {
            if !model.is_empty() {
                self.stream.model = model;
            }
        }

        if let Ok(language) = std::env::var("STREAMSCRIBE_LANGUAGE") {
            if !language.is_empty() {
                self.stream.language = language;
            }
        }

        self
    }

    /// Session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            api_key: self.api.key.clone(),
            endpoint: self.api.endpoint.clone(),
            model: self.stream.model.clone(),
            language: self.stream.language.clone(),
            smart_format: self.stream.smart_format,
            interim_results: self.stream.interim_results,
            endpointing_ms: self.stream.endpointing_ms,
            encoding: self.stream.encoding.clone(),
            sample_rate: self.stream.sample_rate,
            ..SessionConfig::default()
        }
    }

    /// Capture constraints derived from this configuration.
    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            echo_cancellation: self.capture.echo_cancellation,
            noise_suppression: self.capture.noise_suppression,
            sample_rate: self.capture.sample_rate,
        }
    }
}
