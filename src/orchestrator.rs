//! Turn-based debate state machine
//!
//! Fixed cycle per round: contestant A, contestant B, moderator. Each call to
//! [`DebateOrchestrator::advance`] runs exactly one turn:
//!
//! 1. stage the topic if this is the first turn of the session
//! 2. resolve the speaker's binding and memory handle
//! 3. call the model with the topic and the rolling summary
//! 4. append prompt and reply to the speaker's memory
//! 5. commit topic, summary, phase and round to the session
//!
//! Steps 1-4 can fail; step 5 cannot, so a turn either commits whole or leaves
//! the session exactly as it was.

use crate::chat::Role;
use crate::config::DebateConfig;
use crate::error::{Error, Result};
use crate::invoker::ModelInvoker;
use crate::memory::{open_memory, ConversationMemory, MemoryMessage};
use crate::registry::EntityRegistry;
use crate::session::{DebateSession, Utterance};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Drives debate sessions through their turns
pub struct DebateOrchestrator {
    registry: EntityRegistry,
    memory: Arc<dyn ConversationMemory>,
    invoker: ModelInvoker,
}

impl DebateOrchestrator {
    /// Create an orchestrator, checking that every entity is bound to a registered provider
    pub fn new(
        registry: EntityRegistry,
        memory: Arc<dyn ConversationMemory>,
        invoker: ModelInvoker,
    ) -> Result<Self> {
        registry.ensure_complete()?;
        for binding in registry.iter() {
            invoker.ensure_provider(binding)?;
        }

        Ok(Self {
            registry,
            memory,
            invoker,
        })
    }

    /// Build registry, memory backend and model clients from configuration
    pub fn from_config(config: &DebateConfig) -> Result<Self> {
        let registry = EntityRegistry::from_config(config)?;
        let memory = open_memory(&config.memory)?;
        let invoker = ModelInvoker::from_config(config)?;
        Self::new(registry, memory, invoker)
    }

    /// Entity bindings in use
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Memory backend in use
    pub fn memory(&self) -> &Arc<dyn ConversationMemory> {
        &self.memory
    }

    /// Run the next turn of `session`.
    ///
    /// `topic_input` is read only on the first turn of the session and ignored
    /// afterwards.
    pub async fn advance(&self, session: &mut DebateSession, topic_input: &str) -> Result<Utterance> {
        self.advance_cancellable(session, topic_input, std::future::pending())
            .await
    }

    /// Run the next turn unless `cancel` resolves first.
    ///
    /// A cancelled turn returns [`Error::Cancelled`] and commits nothing.
    #[instrument(
        skip_all,
        fields(session_id = %session.id(), round = session.round(), phase = %session.phase())
    )]
    pub async fn advance_cancellable<F>(
        &self,
        session: &mut DebateSession,
        topic_input: &str,
        cancel: F,
    ) -> Result<Utterance>
    where
        F: Future<Output = ()> + Send,
    {
        let entity = session.next_speaker();

        let staged_topic = if session.awaiting_topic() {
            let topic = topic_input.trim();
            if topic.is_empty() {
                return Err(Error::invalid_input("a topic is required to open the debate"));
            }
            Some(topic.to_string())
        } else {
            None
        };
        let topic = staged_topic
            .as_deref()
            .or(session.topic())
            .ok_or_else(|| Error::invalid_input("session has no topic"))?;

        let binding = self.registry.resolve(entity)?;
        let handle = self
            .memory
            .get_or_create(session.id(), &binding.session_key)
            .await?;
        let history = if self.invoker.history_window() > 0 {
            self.memory.history(handle).await?
        } else {
            Vec::new()
        };

        let completion = tokio::select! {
            biased;
            _ = cancel => {
                warn!(%entity, "turn cancelled before commit");
                return Err(Error::Cancelled(format!("{} turn", entity)));
            }
            result = self.invoker.invoke(binding, topic, session.summary(), &history) => result,
        };
        let completion = match completion {
            Ok(completion) => completion,
            Err(err) => {
                warn!(%entity, error = %err, "turn failed; session unchanged");
                return Err(err);
            }
        };

        let round = session.round();
        let prompt = ModelInvoker::user_prompt(topic, session.summary());
        self.memory
            .append(
                handle,
                vec![
                    MemoryMessage::new(Role::User, prompt, round),
                    MemoryMessage::new(Role::Assistant, completion.text.clone(), round),
                ],
            )
            .await?;

        let utterance = Utterance {
            entity,
            speaker: binding.display_name.clone(),
            text: completion.text,
            round,
            timestamp: Utc::now(),
            usage: completion.usage,
        };
        session.commit(staged_topic, utterance.clone());

        info!(
            %entity,
            speaker = %utterance.speaker,
            chars = utterance.text.len(),
            next_phase = %session.phase(),
            next_round = session.round(),
            "turn committed"
        );
        Ok(utterance)
    }

    /// Run turns until the current round closes with the moderator.
    ///
    /// From `ATurn` this is three turns. Each turn commits on its own; if one
    /// fails, the earlier ones stay committed and are in the session transcript.
    pub async fn advance_round(
        &self,
        session: &mut DebateSession,
        topic_input: &str,
    ) -> Result<Vec<Utterance>> {
        let mut utterances = Vec::with_capacity(3);
        loop {
            let closes_round = session.phase().closes_round();
            utterances.push(self.advance(session, topic_input).await?);
            if closes_round {
                return Ok(utterances);
            }
        }
    }

    /// Return `session` to its initial state and drop all of its entity memory.
    ///
    /// Idempotent. If the memory backend fails the session is left untouched.
    #[instrument(skip_all, fields(session_id = %session.id()))]
    pub async fn reset(&self, session: &mut DebateSession) -> Result<()> {
        self.memory.reset(session.id()).await?;
        session.clear();
        info!("session reset");
        Ok(())
    }
}
