use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ops::ai::{BackgroundRemover, CommandRemover, ModelTier, RemovalConfig};
use crate::ops::color_removal::ColorKeyRemover;
use crate::ops::transform::{MAX_DISPLAY_HEIGHT, MAX_DISPLAY_WIDTH};

/// Font families offered in the text panel.
pub const FONT_FAMILIES: &[&str] = &[
    "Arial",
    "Times New Roman",
    "Helvetica",
    "Georgia",
    "Verdana",
    "Courier New",
    "Trebuchet MS",
    "Impact",
    "Comic Sans MS",
    "Palatino",
    "Garamond",
    "Bookman",
    "Tahoma",
    "Lucida Sans",
    "Arial Black",
    "Century Gothic",
    "Franklin Gothic Medium",
    "Copperplate",
    "Optima",
    "Candara",
    "Calibri",
    "Cambria",
    "Didot",
    "Futura",
    "Geneva",
    "Rockwell",
    "Segoe UI",
    "Baskerville",
    "Monaco",
    "Brush Script MT",
];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("settings could not be serialized: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Persisted application settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// External background-removal program. Empty = built-in color key.
    pub remover_command: String,
    pub remover_args: Vec<String>,
    /// Model tier requested from the external remover
    pub model: ModelTier,
    /// Color-key fallback: 0–100
    pub color_key_tolerance: f32,
    /// Color-key fallback: fringe width in pixels
    pub color_key_softness: u32,
    /// Display bounds the drawing surface is fitted into
    pub max_width: u32,
    pub max_height: u32,
    /// Last folder an image was opened from
    pub last_open_dir: Option<PathBuf>,
    /// Last folder an export was written to
    pub last_export_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        let key = ColorKeyRemover::default();
        Self {
            remover_command: String::new(),
            remover_args: Vec::new(),
            model: ModelTier::Medium,
            color_key_tolerance: key.tolerance,
            color_key_softness: key.softness,
            max_width: MAX_DISPLAY_WIDTH,
            max_height: MAX_DISPLAY_HEIGHT,
            last_open_dir: None,
            last_export_dir: None,
        }
    }
}

impl AppSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/backdropfe/settings.toml  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\BackdropFE\settings.toml
    /// On macOS:   ~/Library/Application Support/BackdropFE/settings.toml
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("backdropfe");
            return Some(config_dir.join("settings.toml"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            return Some(PathBuf::from(appdata).join("BackdropFE").join("settings.toml"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("BackdropFE")
                    .join("settings.toml"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("settings.toml")))
        }
    }

    /// Load from the default location. A missing or broken file yields the
    /// defaults.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Ignoring settings file: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save to the default location, logging failures.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log::error!("Saving settings failed: {}", e);
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(io_err)
    }

    pub fn removal_config(&self) -> RemovalConfig {
        RemovalConfig {
            model: self.model,
            ..RemovalConfig::default()
        }
    }

    /// The configured remover: the external command when one is set,
    /// otherwise the built-in color key.
    pub fn remover(&self) -> Arc<dyn BackgroundRemover> {
        if self.remover_command.trim().is_empty() {
            Arc::new(ColorKeyRemover {
                tolerance: self.color_key_tolerance,
                softness: self.color_key_softness,
            })
        } else {
            Arc::new(CommandRemover::new(
                self.remover_command.clone(),
                self.remover_args.clone(),
            ))
        }
    }
}
