use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::BLANK_DIAGRAM_XML;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Element ids that can never be locked, comma separated
    #[serde(default = "default_unlockable_elements")]
    pub unlockable_elements: Vec<String>,

    /// Release a session's other locks whenever it is granted a new one
    #[serde(default)]
    pub enforce_single_lock: bool,

    /// File whose contents seed the shared document at startup
    pub initial_document_path: Option<String>,

    /// Messages queued per session before it is considered stalled and dropped
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

/// Load `app.env` if present, `.env` otherwise. Missing files are fine.
pub fn load_env_files() {
    if std::path::Path::new("app.env").exists() {
        dotenvy::from_filename("app.env").ok();
    } else {
        dotenvy::dotenv().ok();
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Runs before tracing is initialized, so it reports through the result only.
    pub fn load() -> Result<Self, ConfigError> {
        Ok(envy::from_env::<Config>()?)
    }

    /// Default `EnvFilter` directives when `RUST_LOG` is unset
    pub fn log_filter(&self) -> String {
        format!(
            "colabri_diagram=debug,tower_http=debug,axum::rejection=trace,{}",
            self.log_level
        )
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    /// Parsed list of CORS origins, empty if none configured
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Document the shared store starts with
    pub fn initial_document(&self) -> String {
        let Some(path) = &self.initial_document_path else {
            return BLANK_DIAGRAM_XML.to_string();
        };
        match std::fs::read_to_string(path) {
            Ok(xml) => {
                info!("Seeding document from {}", path);
                xml
            }
            Err(e) => {
                warn!("Failed to read initial document {}: {}; using blank template", path, e);
                BLANK_DIAGRAM_XML.to_string()
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            service_name: default_service_name(),
            unlockable_elements: default_unlockable_elements(),
            enforce_single_lock: false,
            initial_document_path: None,
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "colabri-diagram".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_unlockable_elements() -> Vec<String> {
    vec!["canvas".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_from_env_pairs() {
        let vars = vec![
            ("PORT".to_string(), "4100".to_string()),
            ("UNLOCKABLE_ELEMENTS".to_string(), "canvas,Process_1".to_string()),
            ("ENFORCE_SINGLE_LOCK".to_string(), "true".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.port, 4100);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.unlockable_elements, vec!["canvas", "Process_1"]);
        assert!(config.enforce_single_lock);
        assert!(config.is_development());
        assert_eq!(config.outbox_capacity, 256);
    }

    #[test]
    fn log_level_feeds_default_filter() {
        let vars = vec![("LOG_LEVEL".to_string(), "warn".to_string())];
        let config: Config = envy::from_iter(vars).unwrap();
        assert!(config.log_filter().ends_with(",warn"));
        assert!(config.log_filter().starts_with("colabri_diagram=debug"));
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = Config {
            cors_origins: Some("http://a.test, http://b.test,".into()),
            ..Config::default()
        };
        assert_eq!(config.cors_origin_list(), vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn missing_initial_document_falls_back_to_template() {
        let config = Config {
            initial_document_path: Some("/definitely/not/here.bpmn".into()),
            ..Config::default()
        };
        assert_eq!(config.initial_document(), BLANK_DIAGRAM_XML);
    }
}
