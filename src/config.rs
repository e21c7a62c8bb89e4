use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use json_pretty_compact::PrettyCompactFormatter;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Serializer;

use crate::{
    convert::{ExportMode, ExportOptions},
    native::TileIndexOverflow,
    render::PaletteSelector,
};

/// Defaults for the command-line front end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub deduplicate: bool,
    pub export_mode: ExportMode,
    pub palette: PaletteSelector,
    pub transparent_on_zero: bool,
    pub tile_index_overflow: TileIndexOverflow,
    pub tileset_columns: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            deduplicate: true,
            export_mode: ExportMode::Map,
            palette: PaletteSelector::All,
            transparent_on_zero: true,
            tile_index_overflow: TileIndexOverflow::Truncate,
            tileset_columns: 16,
        }
    }
}

impl Settings {
    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            mode: self.export_mode,
            palette: self.palette,
            transparent_on_zero: self.transparent_on_zero,
            tileset_columns: self.tileset_columns,
        }
    }
}

pub fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    info!("Saving {}", path.display());
    let formatter = PrettyCompactFormatter::new();
    let mut data_bytes = vec![];
    let mut ser = Serializer::with_formatter(&mut data_bytes, formatter);
    data.serialize(&mut ser)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &data_bytes)?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    info!("Loading {}", path.display());
    let data_bytes = fs::read(path)?;
    let data: T = serde_json::from_slice(&data_bytes)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    Ok(data)
}

pub fn default_settings_path() -> Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("", "", "jimconv")
        .context("Unable to open config directory.")?;
    Ok(project_dirs.config_dir().join("config.json"))
}

/// Load settings, falling back to defaults when the file does not exist.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        info!("No settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }
    load_json(path)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    save_json(path, settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let settings = Settings {
            deduplicate: false,
            export_mode: ExportMode::Tileset,
            palette: PaletteSelector::Bank2,
            transparent_on_zero: false,
            tile_index_overflow: TileIndexOverflow::Error,
            tileset_columns: 8,
        };
        save_settings(&path, &settings).unwrap();
        let raw: serde_json::Value = load_json(&path).unwrap();
        assert_eq!(raw["palette"], 2);
        assert_eq!(raw["export_mode"], "tileset");
        assert_eq!(raw["tile_index_overflow"], "error");
        assert_eq!(load_settings(&path).unwrap(), settings);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"palette": -1, "tile_index_overflow": "error"}"#).unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.palette, PaletteSelector::All);
        assert_eq!(settings.tile_index_overflow, TileIndexOverflow::Error);
        assert!(settings.deduplicate);
    }
}
