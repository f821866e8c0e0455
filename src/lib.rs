//! AION agent orchestrator
//!
//! A personal-finance assistant built from specialized agents (budget,
//! chatbot, advisor, onboarding, coordinator) that exchange natural
//! language messages and delegate work through a generic function-calling
//! mechanism backed by the Gemini inference API:
//! - Persisted multi-turn conversation history per (agent, user) pair
//! - A registry mapping each agent to the tools it may invoke
//! - A bounded loop letting the model choose tool calls before answering
//! - Transitive delegation between agents through a uniform call contract
//!
//! LOOP SHAPE:
//! LOAD HISTORY → GENERATE → {DISPATCH TOOLS → GENERATE}* → FINAL TEXT

pub mod agents;
pub mod dispatch;
pub mod error;
pub mod finance;
pub mod gateway;
pub mod history;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod router;
pub mod runtime;

pub use error::{AgentError, Result};

// Re-export common types
pub use models::*;
pub use runtime::AgentRuntime;
