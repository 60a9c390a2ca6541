//! Configuration for a debate: providers, entity bindings, memory, logging
//!
//! Everything is supplied once at session start, usually from a YAML file.
//! The defaults reproduce the classic setup: contestant A on Groq, contestant B
//! and the moderator on a local Ollama server.

use crate::error::{Error, Result};
use crate::registry::{default_persona, EntityId};
use dotenvy::dotenv;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "AGON_CONFIG";

/// Top-level debate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    /// Model providers by name
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Entity bindings keyed by entity id (`contestant_a`, `contestant_b`, `moderator`)
    pub entities: BTreeMap<String, EntityConfig>,
    /// Upper bound on a single model call, in seconds
    pub turn_timeout_secs: u64,
    /// Conversation memory settings
    pub memory: MemoryConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Console pacing
    pub presentation: PresentationConfig,
}

impl Default for DebateConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        providers.insert(
            "groq".to_string(),
            ProviderConfig {
                base_url: Url::parse("https://api.groq.com/openai/v1").expect("valid Groq URL"),
                api_key_env: Some("GROQ_API_KEY".to_string()),
                timeout_secs: 120,
            },
        );
        providers.insert(
            "ollama".to_string(),
            ProviderConfig {
                base_url: Url::parse("http://localhost:11434/v1").expect("valid Ollama URL"),
                api_key_env: None,
                timeout_secs: 300,
            },
        );

        let mut entities = BTreeMap::new();
        entities.insert(
            EntityId::ContestantA.as_str().to_string(),
            EntityConfig::new("Contestant A", "groq", "llama-3.3-70b-versatile")
                .with_persona(default_persona(EntityId::ContestantA)),
        );
        entities.insert(
            EntityId::ContestantB.as_str().to_string(),
            EntityConfig::new("Contestant B", "ollama", "llama3.2")
                .with_persona(default_persona(EntityId::ContestantB)),
        );
        entities.insert(
            EntityId::Moderator.as_str().to_string(),
            EntityConfig::new("Moderator", "ollama", "llama3")
                .with_persona(default_persona(EntityId::Moderator)),
        );

        Self {
            providers,
            entities,
            turn_timeout_secs: 180,
            memory: MemoryConfig::default(),
            logging: LoggingConfig::default(),
            presentation: PresentationConfig::default(),
        }
    }
}

impl DebateConfig {
    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Load configuration for the process.
    ///
    /// `.env` is loaded first. An explicit path wins over `AGON_CONFIG`;
    /// with neither, the built-in defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenv();

        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var(CONFIG_ENV) {
                Ok(path) => Self::from_file(path)?,
                Err(_) => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every entity is bound to a declared provider and a model
    pub fn validate(&self) -> Result<()> {
        for id in EntityId::ALL {
            let entity = self.entities.get(id.as_str()).ok_or_else(|| {
                Error::config(format!("No binding configured for entity '{}'", id))
            })?;
            if !self.providers.contains_key(&entity.provider) {
                return Err(Error::config(format!(
                    "Entity '{}' references unknown provider '{}'",
                    id, entity.provider
                )));
            }
            if entity.model.trim().is_empty() {
                return Err(Error::config(format!("Entity '{}' has no model", id)));
            }
        }

        for key in self.entities.keys() {
            key.parse::<EntityId>()?;
        }

        if self.turn_timeout_secs == 0 {
            return Err(Error::config("turn_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Model call timeout as a duration
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }
}

/// One OpenAI-compatible model provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL up to and including the API version (e.g. `http://localhost:11434/v1`)
    pub base_url: Url,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// HTTP timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    120
}

impl ProviderConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<Option<SecretString>> {
        match &self.api_key_env {
            None => Ok(None),
            Some(var) => std::env::var(var)
                .map(|key| Some(SecretString::from(key)))
                .map_err(|_| Error::config(format!("{} environment variable not set", var))),
        }
    }
}

/// Binding of one debate entity to a persona and a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Name shown to the audience and used in the rolling summary
    pub display_name: String,
    /// Provider name (key into `providers`)
    pub provider: String,
    /// Model identifier understood by the provider
    pub model: String,
    /// Persona instructions sent as the system message
    #[serde(default)]
    pub persona: Option<String>,
    /// Memory key; defaults to the entity id
    #[serde(default)]
    pub session_key: Option<String>,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Maximum completion tokens
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl EntityConfig {
    /// Create a new entity binding
    pub fn new(
        display_name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            provider: provider.into(),
            model: model.into(),
            persona: None,
            session_key: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the persona instructions
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Set the memory session key
    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Memory backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackend {
    /// Process-local, lost on exit
    #[default]
    InMemory,
    /// sled database on disk
    Sled,
}

/// Conversation memory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Backend to use
    pub backend: MemoryBackend,
    /// Database directory for the sled backend
    pub path: PathBuf,
    /// Prior memory messages replayed into each request (0 = single-turn)
    pub history_window: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::InMemory,
            path: PathBuf::from("agon_memory"),
            history_window: 0,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "agon=info,warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Console pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Pause between printed turns, in milliseconds
    pub turn_delay_ms: u64,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self { turn_delay_ms: 2000 }
    }
}

impl PresentationConfig {
    /// Pause between printed turns
    pub fn turn_delay(&self) -> Duration {
        Duration::from_millis(self.turn_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DebateConfig::default();
        config.validate().unwrap();
        assert_eq!(config.entities["contestant_a"].provider, "groq");
        assert_eq!(config.entities["moderator"].model, "llama3");
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
providers:
  local:
    base_url: "http://localhost:8000/v1"
entities:
  contestant_a:
    display_name: "Optimist"
    provider: local
    model: "m-a"
    temperature: 0.9
  contestant_b:
    display_name: "Sceptic"
    provider: local
    model: "m-b"
  moderator:
    display_name: "Chair"
    provider: local
    model: "m-m"
    session_key: "chair-thread"
memory:
  backend: sled
  path: "/tmp/agon"
  history_window: 4
logging:
  format: json
"#;
        let config = DebateConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.providers["local"].timeout_secs, 120);
        assert_eq!(config.entities["moderator"].session_key.as_deref(), Some("chair-thread"));
        assert_eq!(config.memory.backend, MemoryBackend::Sled);
        assert_eq!(config.memory.history_window, 4);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.turn_timeout_secs, 180);
    }

    #[test]
    fn test_base_url_round_trips_through_yaml() {
        let yaml = serde_yaml::to_string(&DebateConfig::default()).unwrap();
        let config = DebateConfig::from_yaml(&yaml).unwrap();
        assert_eq!(
            config.providers["ollama"].base_url.as_str(),
            "http://localhost:11434/v1"
        );
        assert_eq!(config.providers["groq"].base_url.host_str(), Some("api.groq.com"));
    }

    #[test]
    fn test_malformed_base_url_is_config_error() {
        let yaml = "providers:\n  broken:\n    base_url: \"not a url\"\n";
        assert!(matches!(
            DebateConfig::from_yaml(yaml),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_entity_fails_validation() {
        let mut config = DebateConfig::default();
        config.entities.remove("contestant_b");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_unknown_provider_fails_validation() {
        let mut config = DebateConfig::default();
        config
            .entities
            .insert("moderator".to_string(), EntityConfig::new("Moderator", "nowhere", "llama3"));
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unknown_entity_key_fails_validation() {
        let mut config = DebateConfig::default();
        config
            .entities
            .insert("judge".to_string(), EntityConfig::new("Judge", "ollama", "llama3"));
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_missing_api_key_env_is_config_error() {
        let provider = ProviderConfig {
            base_url: Url::parse("https://example.invalid/v1").unwrap(),
            api_key_env: Some("AGON_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
            timeout_secs: 10,
        };
        assert!(matches!(provider.api_key(), Err(Error::Configuration(_))));
    }
}
