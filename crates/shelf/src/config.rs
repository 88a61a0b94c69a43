use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use library::{IndexOptions, SearchOptions};
use metadata::MetadataMode;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub min_query_chars: usize,
    pub max_query_chars: usize,
    pub fuzzy_limit: usize,
    pub fuzzy_cutoff: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        let defaults = SearchOptions::default();
        Self {
            min_query_chars: defaults.min_query_chars,
            max_query_chars: defaults.max_query_chars,
            fuzzy_limit: defaults.fuzzy_limit,
            fuzzy_cutoff: defaults.fuzzy_cutoff,
        }
    }
}

impl SearchSettings {
    pub fn to_options(&self) -> SearchOptions {
        SearchOptions {
            min_query_chars: self.min_query_chars,
            max_query_chars: self.max_query_chars,
            fuzzy_limit: self.fuzzy_limit,
            fuzzy_cutoff: self.fuzzy_cutoff,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub size_limit_bytes: u64,
    pub segment_budget_bytes: u64,
    pub transcoder: String,
    pub timeout_secs: u64,
    /// Word used in the " (Part N)" suffix of split files.
    pub part_label: String,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            size_limit_bytes: 40_000_000,
            segment_budget_bytes: 39_000_000,
            transcoder: "ffmpeg".to_string(),
            timeout_secs: 60 * 60,
            part_label: "Part".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfConfig {
    pub collection_path: String,
    pub metadata_mode: MetadataMode,
    pub extensions: Vec<String>,
    pub votes_path: String,
    pub file_ids_path: String,
    pub page_size: usize,
    pub top_limit: usize,
    pub search: SearchSettings,
    pub normalize: NormalizeConfig,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            collection_path: String::new(),
            metadata_mode: MetadataMode::Filename,
            extensions: vec!["mp3".to_string()],
            votes_path: "votes.redb".to_string(),
            file_ids_path: "file_ids.redb".to_string(),
            page_size: 6,
            top_limit: 100,
            search: SearchSettings::default(),
            normalize: NormalizeConfig::default(),
        }
    }
}

impl ShelfConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection_path.trim().is_empty() {
            return Err(invalid("collection_path is not set"));
        }
        if self.extensions.iter().all(|ext| ext.trim().is_empty()) {
            return Err(invalid("extensions must list at least one audio extension"));
        }
        if self.page_size == 0 {
            return Err(invalid("page_size must be positive"));
        }
        let cutoff = self.search.fuzzy_cutoff;
        if !(0.0..=1.0).contains(&cutoff) {
            return Err(invalid(format!("search.fuzzy_cutoff {} is outside [0, 1]", cutoff)));
        }
        if self.search.min_query_chars > self.search.max_query_chars {
            return Err(invalid("search.min_query_chars exceeds search.max_query_chars"));
        }
        if self.normalize.segment_budget_bytes == 0
            || self.normalize.segment_budget_bytes >= self.normalize.size_limit_bytes
        {
            return Err(invalid(
                "normalize.segment_budget_bytes must be positive and below normalize.size_limit_bytes",
            ));
        }
        if self.normalize.timeout_secs == 0 {
            return Err(invalid("normalize.timeout_secs must be positive"));
        }
        if self.normalize.transcoder.trim().is_empty() {
            return Err(invalid("normalize.transcoder is not set"));
        }
        Ok(())
    }

    /// Extensions lowercased, without dots, empties dropped.
    pub fn index_options(&self) -> IndexOptions {
        let extensions = self
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        IndexOptions {
            mode: self.metadata_mode,
            extensions,
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
            ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("SHELF_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Loads the config, writing the defaults first when the file is missing.
/// The bool is true when the file was created.
pub fn load_or_create_config(path: &Path) -> Result<(ShelfConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ShelfConfig = serde_yaml::from_str(&contents)?;
        if config.votes_path.trim().is_empty() {
            config.votes_path = "votes.redb".to_string();
        }
        if config.file_ids_path.trim().is_empty() {
            config.file_ids_path = "file_ids.redb".to_string();
        }
        return Ok((config, false));
    }

    let config = ShelfConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ShelfConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value.trim());
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}
