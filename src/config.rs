//! Configuration management for commentlens
//!
//! All configuration is loaded from `./config/commentlens.toml`.
//! No hardcoded defaults exist in source code - all defaults are in the config template.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/commentlens.toml";

/// Default configuration file content - this is the ONLY place defaults exist
pub const DEFAULT_CONFIG: &str = include_str!("../config/commentlens.toml");

/// Environment variable holding the classifier API key
pub const CLASSIFIER_API_KEY_ENV: &str = "COMMENTLENS_API_KEY";

/// Environment variable holding the vision-extraction API key
pub const VISION_API_KEY_ENV: &str = "COMMENTLENS_VISION_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' must be greater than zero")]
    ZeroValue { field: String },

    #[error("Duplicate label id in classifier.labels: {0}")]
    DuplicateLabel(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub ingest: IngestConfig,
    pub classifier: ClassifierConfig,
    pub analysis: AnalysisConfig,
    pub extraction: ExtractionConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub download_timeout_secs: u64,
}

/// CSV column mapping. Column inference is a separate tool; this section just
/// names the columns the ingest stage should read.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub text: String,
    pub id: String,
    pub date: String,
    pub first_name: String,
    pub last_name: String,
    pub organization: String,
    pub attachment_files: String,
    #[serde(default)]
    pub submitter: Option<String>,
}

/// One entry of the label vocabulary: `id` is what the classifier returns,
/// `description` is what the prompt shows.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LabelSpec {
    pub id: String,
    pub description: String,
}

/// Classification gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub model: String,
    /// The remote call's own timeout; the watchdog waits this plus the grace
    pub request_timeout_secs: u64,
    pub watchdog_grace_secs: u64,
    /// Additional attempts after the first failure (no backoff)
    pub max_retries: u32,
    /// Explicit system prompt; when empty, one is assembled from the
    /// label/entity vocabulary
    #[serde(default)]
    pub system_prompt: String,
    pub entity_types: Vec<String>,
    pub labels: Vec<LabelSpec>,
}

impl ClassifierConfig {
    /// Entity-type fallback used whenever the service returns something
    /// outside the configured set.
    pub const UNKNOWN_ENTITY: &'static str = "Other/Unknown";
}

/// Parallel analysis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    pub batch_pause_ms: u64,
}

/// Attachment extraction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub attachments_dir: String,
    pub min_local_chars: usize,
    pub max_vision_file_bytes: u64,
    pub vision_base_url: String,
    pub vision_model: String,
    pub vision_timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        // The unknown bucket must always be selectable, whatever the file says
        if !config
            .classifier
            .entity_types
            .iter()
            .any(|e| e == ClassifierConfig::UNKNOWN_ENTITY)
        {
            config
                .classifier
                .entity_types
                .push(ClassifierConfig::UNKNOWN_ENTITY.to_string());
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "http.user_agent".to_string(),
            });
        }
        if self.http.download_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "http.download_timeout_secs".to_string(),
            });
        }

        for (field, url) in [
            ("classifier.base_url", &self.classifier.base_url),
            ("extraction.vision_base_url", &self.extraction.vision_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidUrl {
                    field: field.to_string(),
                    url: url.clone(),
                });
            }
        }

        if self.classifier.model.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "classifier.model".to_string(),
            });
        }
        if self.classifier.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "classifier.request_timeout_secs".to_string(),
            });
        }
        // The watchdog must fire strictly after the call's own timeout
        if self.classifier.watchdog_grace_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "classifier.watchdog_grace_secs".to_string(),
            });
        }
        if self.classifier.labels.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "classifier.labels".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for label in &self.classifier.labels {
            if label.id.is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: "classifier.labels[].id".to_string(),
                });
            }
            if !seen.insert(label.id.as_str()) {
                return Err(ConfigError::DuplicateLabel(label.id.clone()));
            }
        }

        if self.analysis.batch_size == 0 {
            return Err(ConfigError::ZeroValue {
                field: "analysis.batch_size".to_string(),
            });
        }
        if self.analysis.max_workers == 0 {
            return Err(ConfigError::ZeroValue {
                field: "analysis.max_workers".to_string(),
            });
        }

        if self.extraction.attachments_dir.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "extraction.attachments_dir".to_string(),
            });
        }
        if self.extraction.vision_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "extraction.vision_timeout_secs".to_string(),
            });
        }

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default() -> AppConfig {
        toml::from_str(DEFAULT_CONFIG).expect("default config should parse")
    }

    #[test]
    fn test_default_config_parses() {
        let config: Result<AppConfig, _> = toml::from_str(DEFAULT_CONFIG);
        assert!(config.is_ok(), "Default config should parse: {:?}", config.err());
    }

    #[test]
    fn test_default_config_validates() {
        let config = parse_default();
        assert!(config.validate().is_ok(), "Default config should validate");
    }

    #[test]
    fn test_default_config_has_unknown_entity() {
        let config = parse_default();
        assert!(config
            .classifier
            .entity_types
            .iter()
            .any(|e| e == ClassifierConfig::UNKNOWN_ENTITY));
    }

    #[test]
    fn test_default_column_mapping() {
        let config = parse_default();
        assert_eq!(config.ingest.text, "Comment");
        assert_eq!(config.ingest.id, "Document ID");
        assert_eq!(config.ingest.attachment_files, "Attachment Files");
        assert!(config.ingest.submitter.is_none());
    }

    #[test]
    fn test_default_analysis_knobs() {
        let config = parse_default();
        assert_eq!(config.analysis.batch_size, 50);
        assert_eq!(config.analysis.max_workers, 8);
        assert_eq!(config.classifier.max_retries, 3);
    }

    #[test]
    fn test_validation_rejects_empty_labels() {
        let mut config = parse_default();
        config.classifier.labels.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyRequired { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_duplicate_labels() {
        let mut config = parse_default();
        let first = config.classifier.labels[0].clone();
        config.classifier.labels.push(first);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateLabel(_))));
    }

    #[test]
    fn test_validation_rejects_bad_url() {
        let mut config = parse_default();
        config.classifier.base_url = "not-a-url".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let mut config = parse_default();
        config.analysis.max_workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroValue { .. })));
    }
}
