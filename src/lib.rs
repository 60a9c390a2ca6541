//! # agon
//!
//! Turn-based multi-agent debate orchestration.
//!
//! Two contestant personas argue opposing sides of a topic and a moderator
//! closes every round by compressing the discussion into a fresh summary.
//! Each entity is bound to its own model on any OpenAI-compatible endpoint
//! (Groq, Ollama, vLLM, OpenRouter) and keeps its own conversation memory for
//! the life of the session.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agon::{DebateConfig, DebateOrchestrator, DebateSession};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DebateConfig::load(None)?;
//!     let orchestrator = DebateOrchestrator::from_config(&config)?;
//!     let mut session = DebateSession::new();
//!
//!     for utterance in orchestrator
//!         .advance_round(&mut session, "Is human knowledge valuable?")
//!         .await?
//!     {
//!         println!("{}: {}", utterance.speaker, utterance.text);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chat;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod invoker;
pub mod llm_client;
pub mod memory;
pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod types;

// Re-exports for convenience
pub use chat::{ChatClient, CompletionRequest, CompletionResponse, Message, Role};
pub use config::{DebateConfig, EntityConfig, MemoryBackend, ProviderConfig};
pub use error::{Error, Result};
pub use invoker::{Completion, ModelInvoker};
pub use llm_client::LlmClient;
pub use memory::{ConversationMemory, InMemoryStore, MemoryMessage};
pub use orchestrator::DebateOrchestrator;
pub use registry::{EntityBinding, EntityId, EntityRegistry};
pub use session::{DebateSession, Phase, Utterance};
pub use storage::SledStore;
pub use types::{MemoryHandle, SessionId, TokenUsage};
