//! Debate entities and their model bindings

use crate::config::DebateConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One of the three debate participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityId {
    /// Opens every round
    ContestantA,
    /// Answers contestant A
    ContestantB,
    /// Closes every round and compresses the summary
    Moderator,
}

impl EntityId {
    /// All entities in turn order
    pub const ALL: [EntityId; 3] = [Self::ContestantA, Self::ContestantB, Self::Moderator];

    /// Textual identifier used in configuration and memory keys
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContestantA => "contestant_a",
            Self::ContestantB => "contestant_b",
            Self::Moderator => "moderator",
        }
    }

    /// Whether this entity's turn replaces the rolling summary
    pub fn is_moderator(self) -> bool {
        matches!(self, Self::Moderator)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "contestant_a" => Ok(Self::ContestantA),
            "contestant_b" => Ok(Self::ContestantB),
            "moderator" => Ok(Self::Moderator),
            other => Err(Error::config(format!("Unknown entity '{}'", other))),
        }
    }
}

const CONTESTANT_A_PERSONA: &str = "You are Contestant A, drawing on broad expertise across many disciplines. \
Make a concise, persuasive case, at most five lines, that human knowledge and skill excel in every field. \
Support it with at least one real-world example. \
Speak only as Contestant A; never write lines for Contestant B or the Moderator.";

const CONTESTANT_B_PERSONA: &str = "You are Contestant B, with expertise across diverse fields. \
Make a concise, compelling case, at most five lines, that questions the significance and value of human knowledge. \
Support it with at least one real-world example. \
Speak only as Contestant B; never write lines for Contestant A or the Moderator.";

const MODERATOR_PERSONA: &str = "You are a neutral debate moderator who values fairness and civility. \
Summarize where the contestants stand, give each side equal weight, and pose one clear question \
that makes each side clarify or substantiate its view. Steer away from tangents. \
Speak only as the Moderator; never write lines for the contestants.";

/// Built-in persona instructions for an entity
pub fn default_persona(id: EntityId) -> &'static str {
    match id {
        EntityId::ContestantA => CONTESTANT_A_PERSONA,
        EntityId::ContestantB => CONTESTANT_B_PERSONA,
        EntityId::Moderator => MODERATOR_PERSONA,
    }
}

/// Resolved binding of an entity to a persona and a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityBinding {
    /// Entity this binding belongs to
    pub id: EntityId,
    /// Name shown to the audience and used in the summary
    pub display_name: String,
    /// Provider name
    pub provider: String,
    /// Model identifier
    pub model: String,
    /// Persona instructions (system message)
    pub persona: String,
    /// Memory key, stable for the session
    pub session_key: String,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum completion tokens
    pub max_tokens: Option<u32>,
}

impl EntityBinding {
    /// Create a binding with the built-in persona and the entity id as memory key
    pub fn new(
        id: EntityId,
        display_name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            provider: provider.into(),
            model: model.into(),
            persona: default_persona(id).to_string(),
            session_key: id.as_str().to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Replace the persona instructions
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }
}

/// Read-only table of entity bindings for a session
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    bindings: HashMap<EntityId, EntityBinding>,
}

impl EntityRegistry {
    /// Build a registry from explicit bindings; later duplicates win
    pub fn new(bindings: impl IntoIterator<Item = EntityBinding>) -> Self {
        Self {
            bindings: bindings.into_iter().map(|b| (b.id, b)).collect(),
        }
    }

    /// Build the registry from validated configuration
    pub fn from_config(config: &DebateConfig) -> Result<Self> {
        config.validate()?;

        let mut bindings = HashMap::new();
        for (key, entity) in &config.entities {
            let id: EntityId = key.parse()?;
            let binding = EntityBinding {
                id,
                display_name: entity.display_name.clone(),
                provider: entity.provider.clone(),
                model: entity.model.clone(),
                persona: entity
                    .persona
                    .clone()
                    .unwrap_or_else(|| default_persona(id).to_string()),
                session_key: entity
                    .session_key
                    .clone()
                    .unwrap_or_else(|| id.as_str().to_string()),
                temperature: entity.temperature,
                max_tokens: entity.max_tokens,
            };
            bindings.insert(id, binding);
        }

        Ok(Self { bindings })
    }

    /// Look up the binding for an entity
    pub fn resolve(&self, id: EntityId) -> Result<&EntityBinding> {
        self.bindings
            .get(&id)
            .ok_or_else(|| Error::config(format!("No binding registered for entity '{}'", id)))
    }

    /// Look up the binding for a textual entity id
    pub fn resolve_str(&self, id: &str) -> Result<&EntityBinding> {
        self.resolve(id.parse()?)
    }

    /// Fail unless every debate entity has a binding
    pub fn ensure_complete(&self) -> Result<()> {
        for id in EntityId::ALL {
            self.resolve(id)?;
        }
        Ok(())
    }

    /// Iterate bindings in turn order
    pub fn iter(&self) -> impl Iterator<Item = &EntityBinding> {
        EntityId::ALL.into_iter().filter_map(|id| self.bindings.get(&id))
    }
}
