use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::actions::dispatcher::ActionPolicy;
use crate::intent::llm::DEFAULT_LLM_URL;
use crate::outputs::composer::DEFAULT_LOCALE;

/// Below this the orchestrator asks instead of acting.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_HISTORY_CAP: usize = 8;
pub const DEFAULT_HANDLER_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_LLM_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_WAKE_PHRASE: &str = "hey assistant";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_PREFIX: &str = "CONCIERGE_";
/// Roughly 136 years; keeps chrono arithmetic in range.
const MAX_IDLE_TIMEOUT_SECS: u64 = u32::MAX as u64;
pub const CONFIG_PATH_ENV: &str = "CONCIERGE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ClassifierConfig {
    Rules,
    /// Hosted model, falling back to rules when it fails.
    Llm {
        #[serde(default = "default_llm_url")]
        url: String,
        #[serde(default = "default_llm_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::Rules
    }
}

fn default_llm_url() -> String {
    DEFAULT_LLM_URL.to_string()
}

fn default_llm_timeout_ms() -> u64 {
    DEFAULT_LLM_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory,
    File { dir: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub locale: String,
    pub confidence_threshold: f32,
    pub idle_timeout_secs: u64,
    pub history_cap: usize,
    pub handler_timeout_ms: u64,
    pub sweep_interval_secs: u64,
    /// Leading phrase stripped from utterances. `None` disables stripping.
    pub wake_phrase: Option<String>,
    pub log_level: String,
    pub classifier: ClassifierConfig,
    pub store: StoreConfig,
    pub policy: ActionPolicy,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            history_cap: DEFAULT_HISTORY_CAP,
            handler_timeout_ms: DEFAULT_HANDLER_TIMEOUT_MS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            wake_phrase: Some(DEFAULT_WAKE_PHRASE.to_string()),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            classifier: ClassifierConfig::default(),
            store: StoreConfig::default(),
            policy: ActionPolicy::default(),
        }
    }
}

impl AssistantConfig {
    /// File (explicit path, else `CONCIERGE_CONFIG`, else defaults), then
    /// environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// `lookup` receives full variable names (`CONCIERGE_LOCALE`, ...).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LOCALE") {
            self.locale = v;
        }
        if let Some(v) = get("CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = parse_var("CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("IDLE_TIMEOUT_SECS") {
            self.idle_timeout_secs = parse_var("IDLE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("HANDLER_TIMEOUT_MS") {
            self.handler_timeout_ms = parse_var("HANDLER_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("STORE_DIR") {
            self.store = StoreConfig::File { dir: PathBuf::from(v) };
        }
        if let Some(url) = get("LLM_URL") {
            let timeout_ms = match &self.classifier {
                ClassifierConfig::Llm { timeout_ms, .. } => *timeout_ms,
                ClassifierConfig::Rules => DEFAULT_LLM_TIMEOUT_MS,
            };
            self.classifier = ClassifierConfig::Llm { url, timeout_ms };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.history_cap == 0 {
            return Err(ConfigError::Invalid("history_cap must be at least 1".into()));
        }
        if self.idle_timeout_secs == 0 || self.handler_timeout_ms == 0 || self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("timeouts and intervals must be positive".into()));
        }
        if let ClassifierConfig::Llm { timeout_ms: 0, .. } = self.classifier {
            return Err(ConfigError::Invalid("classifier timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_timeout_secs.min(MAX_IDLE_TIMEOUT_SECS) as i64)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}{} has an invalid value: {:?}", ENV_PREFIX, name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_means_defaults() {
        let config = AssistantConfig::from_json_str("{}").unwrap();
        assert_eq!(config, AssistantConfig::default());
        assert_eq!(config.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(config.idle_timeout(), chrono::Duration::seconds(3600));
    }

    #[test]
    fn parses_sections() {
        let config = AssistantConfig::from_json_str(
            r#"{
                "locale": "es-ES",
                "classifier": { "backend": "llm", "url": "http://model:9000" },
                "store": { "backend": "file", "dir": "/var/lib/concierge" },
                "policy": { "denied": ["format_disk"], "confirm": ["send_email"] }
            }"#,
        )
        .unwrap();
        assert_eq!(config.locale, "es-ES");
        assert_eq!(
            config.classifier,
            ClassifierConfig::Llm {
                url: "http://model:9000".into(),
                timeout_ms: DEFAULT_LLM_TIMEOUT_MS
            }
        );
        assert_eq!(config.store, StoreConfig::File { dir: "/var/lib/concierge".into() });
        assert!(config.policy.confirm.contains("send_email"));
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("CONCIERGE_CONFIDENCE_THRESHOLD", "0.75"),
            ("CONCIERGE_LOCALE", "es-MX"),
            ("CONCIERGE_STORE_DIR", "/tmp/sessions"),
            ("CONCIERGE_LOG_LEVEL", " "),
        ]
        .into_iter()
        .collect();
        let mut config = AssistantConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.confidence_threshold, 0.75);
        assert_eq!(config.locale, "es-MX");
        assert_eq!(config.store, StoreConfig::File { dir: "/tmp/sessions".into() });
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn bad_override_is_reported() {
        let mut config = AssistantConfig::default();
        let err = config
            .apply_overrides(|k| (k == "CONCIERGE_IDLE_TIMEOUT_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn validation_rejects_out_of_range() {
        let mut config = AssistantConfig::default();
        config.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
        let mut config = AssistantConfig::default();
        config.history_cap = 0;
        assert!(config.validate().is_err());
        assert!(AssistantConfig::default().validate().is_ok());
    }
}
