use std::path::Path;

use chrono::NaiveDate;
use recordsmith_generate::GenerateOptions;
use recordsmith_validate::PreValidateOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atomic::write_bytes_atomic;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("toml encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
}

/// Contents of `recordsmith.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub generation: GenerationSettings,
    pub validation: PreValidateOptions,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub seed: u64,
    pub max_repair_attempts: u32,
    /// Fixed anchor for date heuristics; today when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<NaiveDate>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let defaults = GenerateOptions::default();
        Self {
            seed: defaults.seed,
            max_repair_attempts: defaults.max_repair_attempts,
            reference_date: defaults.reference_date,
        }
    }
}

impl GenerationSettings {
    pub fn to_options(&self) -> GenerateOptions {
        GenerateOptions {
            seed: self.seed,
            max_repair_attempts: self.max_repair_attempts,
            reference_date: self.reference_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

pub fn load_or_create_settings(path: &Path) -> Result<Settings, SettingsError> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        return Ok(settings);
    }

    let settings = Settings::default();
    save_settings(path, &settings)?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let encoded = toml::to_string_pretty(settings)?;
    write_bytes_atomic(path, encoded.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_defaults_then_reads_edits() {
        let dir = std::env::temp_dir().join(format!("recordsmith-settings-{}", uuid::Uuid::new_v4()));
        let path = dir.join("recordsmith.toml");

        let created = load_or_create_settings(&path).expect("create settings");
        assert_eq!(created, Settings::default());
        assert!(path.exists());

        std::fs::write(
            &path,
            concat!(
                "[generation]\n",
                "seed = 7\n",
                "reference_date = \"2024-06-15\"\n",
                "\n",
                "[validation]\n",
                "timeout_ms = 500\n",
            ),
        )
        .expect("edit settings");
        let loaded = load_or_create_settings(&path).expect("load settings");
        assert_eq!(loaded.generation.seed, 7);
        assert_eq!(loaded.generation.max_repair_attempts, 10);
        assert_eq!(
            loaded.generation.to_options().reference_date,
            NaiveDate::from_ymd_opt(2024, 6, 15)
        );
        assert_eq!(loaded.validation.timeout_ms, Some(500));
        assert_eq!(loaded.validation.chunk_size, 500);
        assert_eq!(loaded.logging.level, "info");

        std::fs::remove_dir_all(dir).ok();
    }
}
