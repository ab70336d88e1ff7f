use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{SelectionRule, StudyRelation};
use crate::error::MirrorError;

pub const DEFAULT_API_URL: &str = "https://www.ebi.ac.uk/metagenomics/api/v1";
pub const DEFAULT_DEST: &str = "./data/";
pub const DEFAULT_EXPERIMENT_TYPE: &str = "amplicon";
pub const DEFAULT_FILE_SUBSTRING: &str = "GO_abundances";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const CONFIG_FILE_NAME: &str = "mgnify-mirror.json";

/// On-disk config file. Every key is optional; missing keys fall through to
/// the environment and then to the built-in defaults.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub dest: Option<String>,
    #[serde(default)]
    pub experiment_type: Option<String>,
    #[serde(default)]
    pub file_substring: Option<String>,
    #[serde(default)]
    pub any_experiment_type: Option<bool>,
    #[serde(default)]
    pub study_relation: Option<StudyRelation>,
    #[serde(default)]
    pub newest_by: Option<String>,
    #[serde(default)]
    pub keep_going: Option<bool>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Command-line values; they win over both the file and the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub dest: Option<String>,
    pub experiment_type: Option<String>,
    pub file_substring: Option<String>,
    pub any_experiment_type: bool,
    pub study_relation: Option<StudyRelation>,
    pub newest_by: Option<String>,
    pub keep_going: bool,
    pub page_size: Option<u32>,
    pub max_retries: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MirrorConfig {
    pub api_url: String,
    pub dest: Utf8PathBuf,
    pub experiment_type: String,
    pub file_substring: String,
    pub any_experiment_type: bool,
    pub study_relation: StudyRelation,
    pub selection: SelectionRule,
    pub keep_going: bool,
    pub page_size: u32,
    pub max_retries: usize,
    pub timeout_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            dest: Utf8PathBuf::from(DEFAULT_DEST),
            experiment_type: DEFAULT_EXPERIMENT_TYPE.to_string(),
            file_substring: DEFAULT_FILE_SUBSTRING.to_string(),
            any_experiment_type: false,
            study_relation: StudyRelation::Samples,
            selection: SelectionRule::First,
            keep_going: false,
            page_size: DEFAULT_PAGE_SIZE,
            max_retries: 0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<MirrorConfig, MirrorError> {
        let config = Self::load_file(path)?;
        Self::resolve_config(config, overrides, |key| std::env::var(key).ok())
    }

    /// Reads the config file. An explicit path must exist; the default
    /// `mgnify-mirror.json` is only used when present.
    pub fn load_file(path: Option<&str>) -> Result<Config, MirrorError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE_NAME),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MirrorError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| MirrorError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config<E>(
        config: Config,
        overrides: ConfigOverrides,
        env: E,
    ) -> Result<MirrorConfig, MirrorError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let defaults = MirrorConfig::default();

        let api_url = overrides
            .api_url
            .or_else(|| env("API_URL"))
            .or(config.api_url)
            .unwrap_or(defaults.api_url)
            .trim_end_matches('/')
            .to_string();
        if api_url.is_empty() {
            return Err(MirrorError::InvalidConfig("api_url is empty".to_string()));
        }

        let dest = overrides
            .dest
            .or(config.dest)
            .map(Utf8PathBuf::from)
            .unwrap_or(defaults.dest);

        let experiment_type = overrides
            .experiment_type
            .or_else(|| env("EXPERIMENT_TYPE"))
            .or(config.experiment_type)
            .unwrap_or(defaults.experiment_type);

        let file_substring = overrides
            .file_substring
            .or_else(|| env("FILE_SUBSTRING"))
            .or(config.file_substring)
            .unwrap_or(defaults.file_substring);
        if file_substring.is_empty() {
            return Err(MirrorError::InvalidConfig(
                "file_substring must not be empty".to_string(),
            ));
        }

        // ANY_EXPERIMENT counts as set whatever its value.
        let any_experiment_type = overrides.any_experiment_type
            || env("ANY_EXPERIMENT").is_some()
            || config.any_experiment_type.unwrap_or(false);

        let page_size = overrides
            .page_size
            .or(config.page_size)
            .unwrap_or(defaults.page_size);
        if page_size == 0 {
            return Err(MirrorError::InvalidConfig(
                "page_size must be greater than zero".to_string(),
            ));
        }

        let selection = match overrides.newest_by.or(config.newest_by) {
            Some(attribute) if !attribute.trim().is_empty() => {
                SelectionRule::NewestBy(attribute.trim().to_string())
            }
            _ => SelectionRule::First,
        };

        Ok(MirrorConfig {
            api_url,
            dest,
            experiment_type,
            file_substring,
            any_experiment_type,
            study_relation: overrides
                .study_relation
                .or(config.study_relation)
                .unwrap_or(defaults.study_relation),
            selection,
            keep_going: overrides.keep_going || config.keep_going.unwrap_or(false),
            page_size,
            max_retries: overrides
                .max_retries
                .or(config.max_retries)
                .unwrap_or(defaults.max_retries),
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_sources() {
        let resolved =
            ConfigLoader::resolve_config(Config::default(), ConfigOverrides::default(), |_| None)
                .unwrap();
        assert_eq!(resolved.api_url, DEFAULT_API_URL);
        assert_eq!(resolved.experiment_type, "amplicon");
        assert_eq!(resolved.file_substring, "GO_abundances");
        assert!(!resolved.any_experiment_type);
        assert!(!resolved.keep_going);
        assert_eq!(resolved.max_retries, 0);
        assert_eq!(resolved.selection, SelectionRule::First);
    }
}
