//! TOML-based configuration for the scanmap engine.
//!
//! Reads and writes [`EngineConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\Scanmap\config.toml`
//! - Linux:    `~/.config/scanmap/config.toml`
//! - macOS:    `~/Library/Application Support/Scanmap/config.toml`
//!
//! A different file can be named with `scanmapd --config <PATH>`.
//!
//! # Example file
//!
//! ```toml
//! [engine]
//! log_level = "debug"
//! debug_level = 1
//!
//! [injection]
//! timeout_ms = 5000
//!
//! [[injection.fix_entries]]
//! original = 0x3A
//! replacement = 0xE03A
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section or a
//! missing key all fall back to the values in this module.

use std::path::{Path, PathBuf};
use std::time::Duration;

use scanmap_core::ScancodeEntry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level engine configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub injection: InjectionSection,
}

/// Process-wide behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Notification channel threshold; writes above it are dropped.
    #[serde(default)]
    pub debug_level: u32,
    /// Message posted to the owner with a status code in `wParam` when an
    /// escape call fails.
    #[serde(default = "default_failure_message_id")]
    pub failure_message_id: u32,
    /// Message the notification channel posts when text is ready.
    #[serde(default = "default_notify_message_id")]
    pub notify_message_id: u32,
}

/// Scancode map injection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InjectionSection {
    /// How long one escape call waits for the remote routine.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Period of the background pass that reclaims timed-out injections.
    #[serde(default = "default_reclaim_interval_ms")]
    pub reclaim_interval_ms: u64,
    /// Entries layered over the existing map on apply.
    #[serde(default = "default_fix_entries")]
    pub fix_entries: Vec<ScancodeEntry>,
}

impl InjectionSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_millis(self.reclaim_interval_ms)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_failure_message_id() -> u32 {
    // WM_APP + 0x101
    0x8101
}
fn default_notify_message_id() -> u32 {
    0x8102
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_reclaim_interval_ms() -> u64 {
    1000
}

/// Moves CapsLock, the key left of `1`, and the two IME conversion keys onto
/// extended codes the keyboard driver leaves alone.
pub fn default_fix_entries() -> Vec<ScancodeEntry> {
    vec![
        ScancodeEntry::new(0x003A, 0xE03A),
        ScancodeEntry::new(0x0029, 0xE029),
        ScancodeEntry::new(0x0070, 0xE070),
        ScancodeEntry::new(0x007B, 0xE07B),
    ]
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            debug_level: 0,
            failure_message_id: default_failure_message_id(),
            notify_message_id: default_notify_message_id(),
        }
    }
}

impl Default for InjectionSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            reclaim_interval_ms: default_reclaim_interval_ms(),
            fix_entries: default_fix_entries(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the default location.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `EngineConfig` from `path`, returning the defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<EngineConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EngineConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &EngineConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `Scanmap` part.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Scanmap"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("scanmap"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Scanmap")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
