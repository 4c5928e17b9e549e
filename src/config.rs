//! # Configuration Module
//!
//! Settings are an explicit value object handed to each component's constructor.
//! They are resolved once at startup from three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A JSON settings file (`settings.json` in the platform config directory,
//!    or the path given with `--config`)
//! 3. `ALMA_*` environment variables
//!
//! Out-of-range values are rejected here, so the scheduling core can trust
//! what it receives.
//!
//! ## Data Storage
//!
//! - Linux: `~/.local/share/alma/alma.db`
//! - macOS: `~/Library/Application Support/alma/alma.db`
//! - Windows: `%APPDATA%\alma\alma.db`

use anyhow::{bail, Context, Result};
use log::debug;
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "ALMA_";

pub const MIN_TARGET_DURATION_MINUTES: u32 = 15;
pub const MAX_TARGET_DURATION_MINUTES: u32 = 60;

/// Default location of the settings file. Not created automatically.
#[must_use]
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("alma").join("settings.json"))
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("alma").join("alma.db"))
        .unwrap_or_else(|| PathBuf::from("alma.db"))
}

/// Runtime settings for the scheduler and its collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Bookend played before the episodes. Counts against the duration budget.
    pub intro_path: Option<PathBuf>,
    /// Bookend played after the episodes. Counts against the duration budget.
    pub outro_path: Option<PathBuf>,
    /// Length of the nightly block, bookends included.
    pub target_duration_minutes: u32,
    /// A completed episode is not picked again for this many days unless its
    /// series is explicitly requested.
    pub repeat_cooldown_days: u32,
    /// Spoken nicknames to canonical series names, e.g. `"blueie" -> "Bluey"`.
    pub keyword_map: BTreeMap<String, String>,
    /// How many shows the request UI lets a child pick per night.
    pub nr_shows_per_night: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            intro_path: None,
            outro_path: None,
            target_duration_minutes: 30,
            repeat_cooldown_days: 14,
            keyword_map: BTreeMap::new(),
            nr_shows_per_night: 3,
        }
    }
}

impl Settings {
    /// Resolve settings from file and process environment, then validate.
    ///
    /// An explicitly given `path` must exist; the default settings file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_settings_path() {
                Some(default) if default.exists() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.normalize_paths()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading settings from {}", path.display());
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// Apply `ALMA_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("DATABASE_PATH") {
            self.database_path = PathBuf::from(value);
        }
        if let Some(value) = var("INTRO_PATH") {
            self.intro_path = non_empty_path(&value);
        }
        if let Some(value) = var("OUTRO_PATH") {
            self.outro_path = non_empty_path(&value);
        }
        if let Some(value) = var("TARGET_DURATION_MINUTES") {
            self.target_duration_minutes = parse_number("TARGET_DURATION_MINUTES", &value)?;
        }
        if let Some(value) = var("REPEAT_COOLDOWN_DAYS") {
            self.repeat_cooldown_days = parse_number("REPEAT_COOLDOWN_DAYS", &value)?;
        }
        if let Some(value) = var("NR_SHOWS_PER_NIGHT") {
            self.nr_shows_per_night = parse_number("NR_SHOWS_PER_NIGHT", &value)?;
        }
        Ok(())
    }

    /// Expand `~` and make every configured path absolute.
    pub fn normalize_paths(&mut self) -> Result<()> {
        self.database_path = absolute(&self.database_path)?;
        if let Some(intro) = &self.intro_path {
            self.intro_path = Some(absolute(intro)?);
        }
        if let Some(outro) = &self.outro_path {
            self.outro_path = Some(absolute(outro)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_TARGET_DURATION_MINUTES..=MAX_TARGET_DURATION_MINUTES)
            .contains(&self.target_duration_minutes)
        {
            bail!(
                "target_duration_minutes must be between {MIN_TARGET_DURATION_MINUTES} and {MAX_TARGET_DURATION_MINUTES}, got {}",
                self.target_duration_minutes
            );
        }
        if self.repeat_cooldown_days < 1 {
            bail!("repeat_cooldown_days must be at least 1");
        }
        if self.nr_shows_per_night < 1 {
            bail!("nr_shows_per_night must be at least 1");
        }
        if let Some((keyword, _)) = self.keyword_map.iter().find(|(k, v)| k.trim().is_empty() || v.trim().is_empty()) {
            bail!("keyword_map contains an empty entry: {keyword:?}");
        }
        Ok(())
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

fn parse_number(name: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{ENV_PREFIX}{name} must be a non-negative integer, got {value:?}"))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir().map_or_else(|| path.to_path_buf(), |home| home.join(rest)),
        Err(_) => path.to_path_buf(),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let expanded = expand_home(path);
    let absolute = expanded
        .absolutize()
        .with_context(|| format!("Failed to resolve path {}", expanded.display()))?;
    Ok(absolute.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.target_duration_minutes, 30);
        assert_eq!(settings.repeat_cooldown_days, 14);
        assert!(settings.database_path.to_string_lossy().ends_with("alma.db"));
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"target_duration_minutes": 45, "keyword_map": {"blueie": "Bluey"}}"#,
        )?;

        let settings = Settings::from_file(&path)?;
        assert_eq!(settings.target_duration_minutes, 45);
        assert_eq!(settings.repeat_cooldown_days, 14);
        assert_eq!(settings.keyword_map.get("blueie").map(String::as_str), Some("Bluey"));
        Ok(())
    }

    #[test]
    fn test_env_overrides_file_values() -> Result<()> {
        let mut settings = Settings::default();
        settings.apply_env(env(&[
            ("ALMA_TARGET_DURATION_MINUTES", "20"),
            ("ALMA_REPEAT_COOLDOWN_DAYS", "7"),
            ("ALMA_INTRO_PATH", "/media/intro.mp4"),
            ("ALMA_OUTRO_PATH", ""),
        ]))?;

        assert_eq!(settings.target_duration_minutes, 20);
        assert_eq!(settings.repeat_cooldown_days, 7);
        assert_eq!(settings.intro_path, Some(PathBuf::from("/media/intro.mp4")));
        assert_eq!(settings.outro_path, None);
        Ok(())
    }

    #[test]
    fn test_malformed_env_value_is_an_error() {
        let mut settings = Settings::default();
        let result = settings.apply_env(env(&[("ALMA_REPEAT_COOLDOWN_DAYS", "two weeks")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        let too_short = Settings { target_duration_minutes: 10, ..Settings::default() };
        assert!(too_short.validate().is_err());

        let too_long = Settings { target_duration_minutes: 61, ..Settings::default() };
        assert!(too_long.validate().is_err());

        let no_cooldown = Settings { repeat_cooldown_days: 0, ..Settings::default() };
        assert!(no_cooldown.validate().is_err());

        let mut empty_alias = Settings::default();
        empty_alias.keyword_map.insert("blueie".to_string(), " ".to_string());
        assert!(empty_alias.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/alma/settings.json"))).is_err());
    }

    #[test]
    fn test_normalize_makes_paths_absolute() -> Result<()> {
        let mut settings = Settings {
            database_path: PathBuf::from("relative/alma.db"),
            intro_path: Some(PathBuf::from("intro.mp4")),
            ..Settings::default()
        };
        settings.normalize_paths()?;
        assert!(settings.database_path.is_absolute());
        assert!(settings.intro_path.unwrap().is_absolute());
        Ok(())
    }
}
