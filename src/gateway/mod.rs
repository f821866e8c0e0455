//! Inference gateway
//!
//! Sole interface to the LLM backend. The live adapter speaks the Gemini
//! generateContent protocol; the scripted gateway substitutes canned
//! replies so the orchestration loop stays testable without a network.

use crate::models::{ToolDeclaration, Turn};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::Mutex;

pub mod gemini;
pub use gemini::GeminiGateway;

/// Manifest of callable tools attachable to a gateway request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolManifest {
    pub function_declarations: Vec<ToolDeclaration>,
}

/// Per-request inference configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub system_instruction: String,
    /// 0 disables the thinking config entirely.
    pub thinking_budget: u32,
    pub tool_manifest: Option<ToolManifest>,
    /// JSON schema forcing structured output; mutually exclusive with
    /// tool use in practice.
    pub response_schema: Option<Value>,
}

impl InferenceConfig {
    pub fn with_response_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self.tool_manifest = None;
        self
    }
}

/// One tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub args: Value,
}

/// What the backend produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayReply {
    /// Plain text, possibly empty.
    Text(String),
    /// One or more tool calls, in emitted order.
    ToolCalls(Vec<ToolCallRequest>),
}

/// Interface to the inference backend.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        turns: &[Turn],
        config: &InferenceConfig,
    ) -> Result<GatewayReply>;
}

/// Scripted gateway for tests and offline development.
/// Keeps the system functional without an LLM dependency.
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<GatewayReply>>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<GatewayReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of generate calls made so far.
    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// (model, history length) per generate call, in order.
    pub async fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl InferenceGateway for ScriptedGateway {
    async fn generate(
        &self,
        model: &str,
        turns: &[Turn],
        _config: &InferenceConfig,
    ) -> Result<GatewayReply> {
        self.calls.lock().await.push((model.to_string(), turns.len()));
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| crate::error::AgentError::Gateway("script exhausted".to_string()))
    }
}
