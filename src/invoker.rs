//! Single-turn model invocation for a debate entity

use crate::chat::{ChatClient, CompletionRequest, Message, Role};
use crate::config::DebateConfig;
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::memory::MemoryMessage;
use crate::registry::EntityBinding;
use crate::types::TokenUsage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Whole reply of one model call
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Reply text with leading and trailing whitespace trimmed, never empty.
    ///
    /// Interior whitespace and line breaks are kept as the model sent them;
    /// only the ends are trimmed so summary lines stay newline-delimited.
    pub text: String,
    /// Tokens consumed, zero when the provider does not report usage
    pub usage: TokenUsage,
}

/// Resolves bindings to clients and issues one request per turn
pub struct ModelInvoker {
    clients: HashMap<String, Arc<dyn LlmClient>>,
    timeout: Duration,
    history_window: usize,
}

impl ModelInvoker {
    /// Create an invoker with no providers
    pub fn new(timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            timeout,
            history_window: 0,
        }
    }

    /// Build one [`ChatClient`] per configured provider
    pub fn from_config(config: &DebateConfig) -> Result<Self> {
        let mut invoker = Self::new(config.turn_timeout())
            .with_history_window(config.memory.history_window);
        for (name, provider) in &config.providers {
            let client = ChatClient::new(name.clone(), provider)?;
            invoker = invoker.with_client(name.clone(), Arc::new(client));
        }
        Ok(invoker)
    }

    /// Register a client under a provider name
    pub fn with_client(mut self, provider: impl Into<String>, client: Arc<dyn LlmClient>) -> Self {
        self.clients.insert(provider.into(), client);
        self
    }

    /// Number of memory messages replayed ahead of the turn's user message
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Number of memory messages replayed per request
    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Fail unless the binding's provider is registered
    pub fn ensure_provider(&self, binding: &EntityBinding) -> Result<()> {
        self.client_for(binding).map(|_| ())
    }

    fn client_for(&self, binding: &EntityBinding) -> Result<&Arc<dyn LlmClient>> {
        self.clients.get(&binding.provider).ok_or_else(|| {
            Error::config(format!(
                "Entity '{}' is bound to unregistered provider '{}'",
                binding.id, binding.provider
            ))
        })
    }

    /// User-role message for a turn
    pub fn user_prompt(topic: &str, summary: &str) -> String {
        format!("Topic: {}\n{}", topic, summary)
    }

    /// Assemble the request: persona, optional replayed history, then the turn prompt
    pub fn build_request(
        &self,
        binding: &EntityBinding,
        topic: &str,
        summary: &str,
        history: &[MemoryMessage],
    ) -> CompletionRequest {
        let mut messages = vec![Message::system(&binding.persona)];

        let replay_from = history.len().saturating_sub(self.history_window);
        messages.extend(history[replay_from..].iter().map(|m| match m.role {
            Role::System => Message::system(&m.content),
            Role::User => Message::user(&m.content),
            Role::Assistant => Message::assistant(&m.content),
        }));
        messages.push(Message::user(Self::user_prompt(topic, summary)));

        let mut request = CompletionRequest::new(&binding.model, messages);
        if let Some(temperature) = binding.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = binding.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    /// Run one turn's model call to completion.
    ///
    /// No retries. A timeout, transport failure, HTTP error or empty reply
    /// is returned as an error and the caller decides what to do.
    #[instrument(skip(self, binding, topic, summary, history), fields(entity = %binding.id, model = %binding.model))]
    pub async fn invoke(
        &self,
        binding: &EntityBinding,
        topic: &str,
        summary: &str,
        history: &[MemoryMessage],
    ) -> Result<Completion> {
        let client = self.client_for(binding)?;
        let request = self.build_request(binding, topic, summary, history);
        let entity = binding.id.as_str();
        debug!(client = client.client_type(), prompt = %Self::user_prompt(topic, summary), "invoking model");

        let response = match tokio::time::timeout(self.timeout, client.complete(request)).await {
            Err(_) => return Err(Error::timeout(entity, self.timeout.as_secs())),
            Ok(Err(Error::ModelInvocation { message, .. })) => {
                return Err(Error::invocation(entity, message))
            }
            Ok(Err(Error::ModelTimeout { seconds, .. })) => {
                return Err(Error::timeout(entity, seconds))
            }
            Ok(Err(other)) => return Err(Error::invocation(entity, other.to_string())),
            Ok(Ok(response)) => response,
        };

        let text = response.text().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(Error::invocation(entity, "model returned an empty reply"));
        }

        Ok(Completion {
            text: text.to_string(),
            usage: response.usage.clone().map(TokenUsage::from).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Choice, CompletionResponse};
    use crate::registry::EntityId;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Recorder {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
        delay: Duration,
    }

    #[async_trait]
    impl LlmClient for Recorder {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.seen.lock().push(request);
            tokio::time::sleep(self.delay).await;
            Ok(CompletionResponse {
                id: "r".into(),
                model: "m".into(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.reply.clone()),
                    finish_reason: None,
                }],
                usage: None,
            })
        }

        fn client_type(&self) -> &str {
            "recorder"
        }

        fn endpoint(&self) -> &str {
            "memory://"
        }
    }

    fn recorder(reply: &str, delay: Duration) -> Arc<Recorder> {
        Arc::new(Recorder {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn binding() -> EntityBinding {
        EntityBinding::new(EntityId::ContestantB, "Contestant B", "local", "llama3.2")
    }

    #[tokio::test]
    async fn test_request_is_persona_plus_single_user_message() {
        let client = recorder("  Knowledge decays.  ", Duration::ZERO);
        let invoker = ModelInvoker::new(Duration::from_secs(5)).with_client("local", client.clone());

        let completion = invoker
            .invoke(&binding(), "Is knowledge valuable?", "Contestant A: yes\n", &[])
            .await
            .unwrap();

        assert_eq!(completion.text, "Knowledge decays.");
        let seen = client.seen.lock();
        let messages = &seen[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, binding().persona);
        assert_eq!(messages[1].content, "Topic: Is knowledge valuable?\nContestant A: yes\n");
    }

    #[tokio::test]
    async fn test_history_window_replays_latest_messages() {
        let client = recorder("ok", Duration::ZERO);
        let invoker = ModelInvoker::new(Duration::from_secs(5))
            .with_client("local", client.clone())
            .with_history_window(2);
        let history = vec![
            MemoryMessage::new(Role::User, "old prompt", 1),
            MemoryMessage::new(Role::User, "prompt 2", 2),
            MemoryMessage::new(Role::Assistant, "reply 2", 2),
        ];

        invoker.invoke(&binding(), "t", "", &history).await.unwrap();

        let seen = client.seen.lock();
        let contents: Vec<_> = seen[0].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents[1..], ["prompt 2", "reply 2", "Topic: t\n"]);
    }

    #[tokio::test]
    async fn test_reply_keeps_interior_text() {
        let reply = "\n\nFirst point.\n\n  Second point, indented.\n";
        let invoker = ModelInvoker::new(Duration::from_secs(5))
            .with_client("local", recorder(reply, Duration::ZERO));

        let completion = invoker.invoke(&binding(), "t", "", &[]).await.unwrap();
        assert_eq!(completion.text, "First point.\n\n  Second point, indented.");
    }

    #[tokio::test]
    async fn test_empty_reply_is_invocation_error() {
        let invoker = ModelInvoker::new(Duration::from_secs(5))
            .with_client("local", recorder("   ", Duration::ZERO));
        let err = invoker.invoke(&binding(), "t", "", &[]).await.unwrap_err();
        assert!(matches!(err, Error::ModelInvocation { ref entity, .. } if entity == "contestant_b"));
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let invoker = ModelInvoker::new(Duration::from_millis(20))
            .with_client("local", recorder("late", Duration::from_secs(5)));
        let err = invoker.invoke(&binding(), "t", "", &[]).await.unwrap_err();
        assert!(matches!(err, Error::ModelTimeout { .. }));
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_configuration_error() {
        let invoker = ModelInvoker::new(Duration::from_secs(5));
        assert!(matches!(
            invoker.invoke(&binding(), "t", "", &[]).await,
            Err(Error::Configuration(_))
        ));
    }
}
