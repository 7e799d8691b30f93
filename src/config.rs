use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Default,
    Cyber,
    Emerald,
    Ocean,
    Forest,
}

impl Theme {
    pub fn all() -> Vec<Theme> {
        vec![
            Theme::Default,
            Theme::Cyber,
            Theme::Emerald,
            Theme::Ocean,
            Theme::Forest,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Theme::Default => "Default",
            Theme::Cyber => "Cyber",
            Theme::Emerald => "Emerald",
            Theme::Ocean => "Ocean",
            Theme::Forest => "Forest",
        }
    }

    pub fn next(&self) -> Theme {
        match self {
            Theme::Default => Theme::Cyber,
            Theme::Cyber => Theme::Emerald,
            Theme::Emerald => Theme::Ocean,
            Theme::Ocean => Theme::Forest,
            Theme::Forest => Theme::Default,
        }
    }
}

/// User settings, read once at startup and written on every change. The
/// loaded value is passed around as an immutable snapshot; nothing reads it
/// from a global.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub disable_animations: bool,
    pub theme: Theme,
}

impl Settings {
    /// Loads settings, substituting the default when the file is absent or
    /// corrupt. Corruption is not fatal; the file is overwritten on the next
    /// save.
    pub fn load() -> Self {
        match Self::settings_path() {
            Ok(path) => Self::load_from(&path),
            Err(err) => {
                warn!(%err, "could not determine settings path, using defaults");
                Self::default()
            }
        }
    }

    fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(err) => {
                warn!(%err, "settings file is corrupt, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    fn settings_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("could not determine config directory"))?;
        Ok(config_dir.join("campuschat").join("settings.json"))
    }
}

/// Directory for the log file; lives next to the settings file.
pub fn log_dir() -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("could not determine config directory"))?;
    Ok(config_dir.join("campuschat"))
}
