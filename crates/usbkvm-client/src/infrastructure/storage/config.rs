//! TOML configuration for the usbkvm client.
//!
//! The file is read from `--config <path>` when given, otherwise from the
//! platform config directory:
//! - Windows:  `%APPDATA%\usbkvm\config.toml`
//! - Linux:    `~/.config/usbkvm/config.toml`
//! - macOS:    `~/Library/Application Support/usbkvm/config.toml`
//!
//! A missing file is not an error: every field has a default, so the client
//! runs out of the box against the last serial port it can find.
//!
//! ```toml
//! [controller]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! timeout_ms = 1000
//!
//! [screen]
//! width = 1920
//! height = 1080
//!
//! [shortcut_keys]
//! task_manager = ["ctrl", "shift", "esc"]
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent, and whole sections fall back to
//! their `Default` impl through `#[serde(default)]`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use usbkvm_core::{Point, Resolution};

use crate::application::input_translator::TranslatorSettings;
use crate::application::session::report_interval;
use crate::infrastructure::serial::{SerialSettings, AUTO_PORT};

/// Error type for configuration loading.
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
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub screen: ScreenConfig,
    #[serde(default)]
    pub mouse: MouseConfig,
    #[serde(default)]
    pub paste: PasteConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Named key chords, e.g. `task_manager = ["ctrl", "shift", "esc"]`.
    #[serde(default)]
    pub shortcut_keys: BTreeMap<String, Vec<String>>,
}

/// Serial connection to the chip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerConfig {
    /// Device path, or `"auto"` for the last enumerated port.
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout for chip replies, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// The remote screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenConfig {
    #[serde(default = "default_screen_width")]
    pub width: u32,
    #[serde(default = "default_screen_height")]
    pub height: u32,
    /// Letterbox the viewport to the remote aspect ratio.
    #[serde(default = "default_true")]
    pub keep_aspect_ratio: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MouseConfig {
    /// Multiplier for relative-mode motion.
    #[serde(default = "default_relative_speed")]
    pub relative_speed: f64,
    /// Mouse reports per second; `0` derives the rate from `refresh_rate`.
    #[serde(default)]
    pub report_freq: u32,
    /// Local display refresh rate in Hz; `0` means unknown.
    #[serde(default)]
    pub refresh_rate: f64,
    /// Apply `cursor_offset_x`/`cursor_offset_y` in absolute mode.
    #[serde(default)]
    pub cursor_correction: bool,
    #[serde(default)]
    pub cursor_offset_x: i32,
    #[serde(default)]
    pub cursor_offset_y: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PasteConfig {
    /// Pause between typed characters, in milliseconds.
    #[serde(default = "default_paste_interval_ms")]
    pub interval_ms: u64,
    /// How long a shortcut chord is held, in milliseconds.
    #[serde(default = "default_shortcut_hold_ms")]
    pub shortcut_hold_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_port() -> String {
    AUTO_PORT.to_string()
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_timeout_ms() -> u64 {
    1000
}
fn default_screen_width() -> u32 {
    1920
}
fn default_screen_height() -> u32 {
    1080
}
fn default_true() -> bool {
    true
}
fn default_relative_speed() -> f64 {
    1.0
}
fn default_paste_interval_ms() -> u64 {
    10
}
fn default_shortcut_hold_ms() -> u64 {
    50
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: default_screen_width(),
            height: default_screen_height(),
            keep_aspect_ratio: default_true(),
        }
    }
}

impl Default for MouseConfig {
    fn default() -> Self {
        Self {
            relative_speed: default_relative_speed(),
            report_freq: 0,
            refresh_rate: 0.0,
            cursor_correction: false,
            cursor_offset_x: 0,
            cursor_offset_y: 0,
        }
    }
}

impl Default for PasteConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_paste_interval_ms(),
            shortcut_hold_ms: default_shortcut_hold_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl AppConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.screen.width, self.screen.height)
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            port: self.controller.port.clone(),
            baud_rate: self.controller.baud_rate,
            timeout: Duration::from_millis(self.controller.timeout_ms),
            screen: self.resolution(),
        }
    }

    pub fn translator_settings(&self) -> TranslatorSettings {
        let cursor_offset = self.mouse.cursor_correction.then(|| {
            Point::new(
                f64::from(self.mouse.cursor_offset_x),
                f64::from(self.mouse.cursor_offset_y),
            )
        });
        TranslatorSettings {
            target: self.resolution(),
            keep_aspect_ratio: self.screen.keep_aspect_ratio,
            cursor_offset,
            relative_speed: self.mouse.relative_speed,
            paste_interval: Duration::from_millis(self.paste.interval_ms),
            shortcut_hold: Duration::from_millis(self.paste.shortcut_hold_ms),
        }
    }

    /// Mouse flush period derived from `[mouse] report_freq` and
    /// `refresh_rate`.
    pub fn report_interval(&self) -> Duration {
        report_interval(self.mouse.report_freq, self.mouse.refresh_rate)
    }

    /// Looks up a named shortcut.
    pub fn shortcut(&self, name: &str) -> Option<&[String]> {
        self.shortcut_keys.get(name).map(Vec::as_slice)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Loads the config from `path` when given, else from the platform default
/// location.  With no usable platform directory the defaults are used.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => load_config_from(path),
        None => match config_file_path() {
            Ok(path) => load_config_from(&path),
            Err(ConfigError::NoPlatformConfigDir) => Ok(AppConfig::default()),
            Err(e) => Err(e),
        },
    }
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("usbkvm"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("usbkvm"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("usbkvm")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
