//! Core data models for the AION agent runtime

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

//
// ================= Agent =================
//

/// Canonical configuration of one agent: identity, model, instructions,
/// and inference-time reasoning effort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDefinition {
    /// Stable identity; tool registrations and history are keyed by it.
    pub name: String,
    pub description: String,
    /// Gemini model id, e.g. "gemini-2.5-flash-lite".
    pub model: String,
    pub system_instruction: String,
    /// 0 disables thinking entirely.
    pub thinking_budget: u32,
}

//
// ================= Turns =================
//

/// Wire-level role vocabulary understood by the inference backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Model => write!(f, "model"),
        }
    }
}

/// What a single history turn contains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnKind {
    UserText { text: String },
    ModelText { text: String },
    ToolRequest { name: String, args: Value },
    ToolResult { name: String, result: InvocationResult },
}

impl TurnKind {
    /// Project onto the two-role wire vocabulary. Tool results travel as
    /// role=user because the external protocol has no dedicated tool role.
    pub fn role(&self) -> TurnRole {
        match self {
            TurnKind::UserText { .. } | TurnKind::ToolResult { .. } => TurnRole::User,
            TurnKind::ModelText { .. } | TurnKind::ToolRequest { .. } => TurnRole::Model,
        }
    }
}

/// One immutable unit of conversation history, owned by an
/// (agent, user) pair and totally ordered by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: Uuid,
    pub agent: String,
    pub user_id: Uuid,
    pub kind: TurnKind,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(agent: impl Into<String>, user_id: Uuid, kind: TurnKind) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            agent: agent.into(),
            user_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}

//
// ================= Invocation =================
//

/// Uniform result of any tool or worker-agent invocation.
///
/// The serialized form is the `{"type": ...}` contract that gets persisted
/// inside tool-result turns and echoed back to the inference backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InvocationResult {
    Success { data: Value },
    Error { message: String },
}

impl InvocationResult {
    pub fn success(data: Value) -> Self {
        InvocationResult::Success { data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        InvocationResult::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success { .. })
    }
}

/// Schema card describing one callable tool; passed verbatim to the
/// gateway as data, never as code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema object with a required-field list.
    pub parameters: Value,
}

/// Identity context injected into every tool invocation.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub user_id: Uuid,
    /// Agent whose session is running.
    pub agent: String,
    /// Cross-loop delegation depth, separate from any loop's round counter.
    pub depth: u32,
}

impl CallContext {
    pub fn new(user_id: Uuid, agent: impl Into<String>) -> Self {
        Self {
            user_id,
            agent: agent.into(),
            depth: 0,
        }
    }

    /// Context for a delegated peer-agent session, one level deeper.
    pub fn delegate_to(&self, agent: impl Into<String>) -> Self {
        Self {
            user_id: self.user_id,
            agent: agent.into(),
            depth: self.depth + 1,
        }
    }
}

//
// ================= Session =================
//

/// Record of one dispatched tool call within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub args: Value,
}

/// Terminal result of a completed orchestration session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Final plain-text answer from the model.
    pub message: String,
    /// Gateway rounds consumed, 1-based.
    pub rounds: u32,
    /// Tool calls dispatched during the session, in emitted order.
    pub invocations: Vec<ToolInvocation>,
}
