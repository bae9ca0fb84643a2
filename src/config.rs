//! Configuration types for the edge client
//!
//! Loaded from TOML. Every field has a default matching the deployed
//! SafeStep installation, so an empty file (or no file) is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "SAFESTEP_CONFIG";

/// Config file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "safestep.toml";

/// Top-level client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub detector: DetectorConfig,
}

/// Control channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Identity sent in the `[id]` packet
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// How long to wait for a rejection after identifying
    #[serde(default = "default_identify_timeout")]
    pub identify_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// 0 = retry forever
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Substrings in a handshake response that mean the id was refused
    #[serde(default = "default_rejection_markers")]
    pub rejection_markers: Vec<String>,
    #[serde(default = "default_read_buffer")]
    pub read_buffer_size: usize,
}

/// Where captured frames are written and how the server refers to them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Local directory (an NFS share in production)
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    /// Prefix the server uses for the same directory
    #[serde(default = "default_report_prefix")]
    pub report_prefix: String,
}

/// Which capture source to build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSourceKind {
    #[default]
    Command,
    Directory,
}

/// Camera settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub source: CaptureSourceKind,
    /// Frame grabber executable for `command` sources
    #[serde(default = "default_capture_program")]
    pub program: String,
    /// Grabber arguments; `{device}` and `{output}` are substituted
    #[serde(default = "default_capture_args")]
    pub args: Vec<String>,
    #[serde(default = "default_device")]
    pub device: Option<PathBuf>,
    /// Image directory for `directory` sources
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub loop_playback: bool,
}

/// Detection collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Detector executable; `None` means no model is available
    #[serde(default)]
    pub program: Option<String>,
    /// Detector arguments; `{image}` and `{model}` are substituted
    #[serde(default = "default_detector_args")]
    pub args: Vec<String>,
    #[serde(default = "default_model_path")]
    pub model_path: Option<PathBuf>,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
}

fn default_host() -> String {
    "10.10.141.80".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_client_id() -> String {
    "JETSON".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_identify_timeout() -> u64 {
    1000
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_rejection_markers() -> Vec<String> {
    vec!["등록되지 않은 ID".to_string(), "이미 로그인".to_string()]
}

fn default_read_buffer() -> usize {
    256 + 20 // message + sender name
}

fn default_local_root() -> PathBuf {
    PathBuf::from("/mnt/pi_nfs/Pictures/")
}

fn default_report_prefix() -> String {
    "images/".to_string()
}

fn default_capture_program() -> String {
    "fswebcam".to_string()
}

fn default_capture_args() -> Vec<String> {
    ["-d", "{device}", "--no-banner", "-r", "1280x720", "{output}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_device() -> Option<PathBuf> {
    Some(PathBuf::from("/dev/video0"))
}

fn default_true() -> bool {
    true
}

fn default_detector_args() -> Vec<String> {
    vec!["{model}".to_string(), "{image}".to_string()]
}

fn default_model_path() -> Option<PathBuf> {
    Some(PathBuf::from("./best.pt"))
}

fn default_confidence() -> f32 {
    0.5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            connect_timeout_secs: default_connect_timeout(),
            identify_timeout_ms: default_identify_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_attempts: 0,
            rejection_markers: default_rejection_markers(),
            read_buffer_size: default_read_buffer(),
        }
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_millis(self.identify_timeout_ms.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Check a handshake response against the rejection markers
    pub fn is_rejection(&self, response: &str) -> bool {
        self.rejection_markers
            .iter()
            .any(|marker| !marker.is_empty() && response.contains(marker.as_str()))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_root: default_local_root(),
            report_prefix: default_report_prefix(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: CaptureSourceKind::Command,
            program: default_capture_program(),
            args: default_capture_args(),
            device: default_device(),
            directory: None,
            loop_playback: true,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: default_detector_args(),
            model_path: default_model_path(),
            confidence_threshold: default_confidence(),
        }
    }
}

impl ClientConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Resolve the config from `SAFESTEP_CONFIG`, then `./safestep.toml`,
    /// then built-in defaults.
    pub fn discover() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            log::info!("Loading config from {} ({})", path, CONFIG_ENV);
            return Self::load(path);
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            log::info!("Loading config from {}", local.display());
            return Self::load(local);
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Override the server port
    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }
}
