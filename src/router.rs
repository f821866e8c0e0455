//! Inter-agent routing
//!
//! Delegation tools that let one agent drive a peer agent's own
//! orchestration loop through the uniform worker contract. Targets are
//! validated against a fixed per-caller allow-list, and every hop carries
//! an explicit delegation-depth counter so mutual recursion between
//! agents stays bounded.

use crate::error::AgentError;
use crate::models::{CallContext, InvocationResult, ToolDeclaration};
use crate::registry::AgentTool;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Cross-loop delegation bound, separate from each loop's round cap.
pub const MAX_DELEGATION_DEPTH: u32 = 4;

/// Uniform worker contract every delegate-able agent implements.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// Resolve one message for one user, returning a JSON-serializable
    /// result. Never panics; failures come back as error results.
    async fn process(&self, ctx: &CallContext, message: &str) -> InvocationResult;
}

/// Name → handler lookup, filled by the composition root after handler
/// construction (replaces lazy imports in the original service layer).
pub struct AgentDirectory {
    handlers: RwLock<HashMap<String, Arc<dyn AgentHandler>>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, name: impl Into<String>, handler: Arc<dyn AgentHandler>) {
        self.handlers.write().await.insert(name.into(), handler);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn AgentHandler>> {
        self.handlers.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for AgentDirectory {
    fn default() -> Self {
        Self::new()
    }
}

fn message_arg(args: &Value) -> Option<&str> {
    args.get("message").and_then(Value::as_str)
}

/// Route a validated delegation to the target's handler, one level deeper.
async fn dispatch_to(
    directory: &AgentDirectory,
    target: &str,
    ctx: &CallContext,
    message: &str,
) -> Result<InvocationResult> {
    if ctx.depth >= MAX_DELEGATION_DEPTH {
        warn!(
            caller = %ctx.agent,
            target,
            depth = ctx.depth,
            "Delegation depth limit reached"
        );
        return Ok(InvocationResult::error(
            AgentError::DelegationDepthExceeded(ctx.depth).to_string(),
        ));
    }

    let Some(handler) = directory.get(target).await else {
        return Ok(InvocationResult::error(
            AgentError::UnrecognizedAgent(target.to_string()).to_string(),
        ));
    };

    info!(caller = %ctx.agent, target, depth = ctx.depth, "Delegating to agent");

    let child = ctx.delegate_to(target);
    Ok(handler.process(&child, message).await)
}

//
// ================= send_message_to_agent =================
//

/// Generic delegation tool with a fixed per-caller allow-list. An unlisted
/// target fails before any dispatch is attempted.
pub struct DelegateTool {
    directory: Arc<AgentDirectory>,
    allowed: Vec<String>,
}

impl DelegateTool {
    pub fn new(directory: Arc<AgentDirectory>, allowed: Vec<String>) -> Self {
        Self { directory, allowed }
    }

    pub fn declaration(&self) -> ToolDeclaration {
        delegate_declaration(&self.allowed)
    }
}

/// Build a `send_message_to_agent` declaration enumerating the caller's
/// allowed targets.
pub fn delegate_declaration(allowed: &[String]) -> ToolDeclaration {
    ToolDeclaration {
        name: "send_message_to_agent".to_string(),
        description: "Sends a message to another specialized agent in the AION system. \
                      Use this to delegate tasks to other agents."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "agent_name": {
                    "type": "string",
                    "enum": allowed,
                    "description": format!(
                        "The name of the agent to call. Available agents: {}",
                        allowed.join(", ")
                    )
                },
                "message": {
                    "type": "string",
                    "description": "The message or request to send to the specified agent."
                }
            },
            "required": ["agent_name", "message"]
        }),
    }
}

#[async_trait]
impl AgentTool for DelegateTool {
    async fn invoke(&self, ctx: &CallContext, args: Value) -> Result<InvocationResult> {
        let Some(target) = args.get("agent_name").and_then(Value::as_str) else {
            return Ok(InvocationResult::error("Missing 'agent_name' parameter"));
        };
        let Some(message) = message_arg(&args) else {
            return Ok(InvocationResult::error("Missing 'message' parameter"));
        };

        if !self.allowed.iter().any(|a| a == target) {
            warn!(caller = %ctx.agent, target, "Delegation target outside allow-list");
            return Ok(InvocationResult::error(
                AgentError::UnrecognizedAgent(target.to_string()).to_string(),
            ));
        }

        dispatch_to(&self.directory, target, ctx, message).await
    }
}

//
// ================= call_<agent> =================
//

/// Fixed-target delegation tool backing the `call_*` family
/// (`call_budget_agent`, `call_main_coordinator`, ...).
pub struct AgentCallTool {
    directory: Arc<AgentDirectory>,
    target: String,
    declaration: ToolDeclaration,
}

impl AgentCallTool {
    pub fn new(
        directory: Arc<AgentDirectory>,
        target: impl Into<String>,
        name: &str,
        description: &str,
    ) -> Self {
        Self {
            directory,
            target: target.into(),
            declaration: ToolDeclaration {
                name: name.to_string(),
                description: description.to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "message": {
                            "type": "string",
                            "description": "The request or instruction to send to the agent."
                        }
                    },
                    "required": ["message"]
                }),
            },
        }
    }

    pub fn declaration(&self) -> ToolDeclaration {
        self.declaration.clone()
    }
}

#[async_trait]
impl AgentTool for AgentCallTool {
    async fn invoke(&self, ctx: &CallContext, args: Value) -> Result<InvocationResult> {
        let Some(message) = message_arg(&args) else {
            return Ok(InvocationResult::error("Missing 'message' parameter"));
        };
        dispatch_to(&self.directory, &self.target, ctx, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct RecordingHandler {
        calls: AtomicUsize,
    }

    impl RecordingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AgentHandler for RecordingHandler {
        async fn process(&self, ctx: &CallContext, message: &str) -> InvocationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            InvocationResult::success(json!({
                "message": format!("handled: {}", message),
                "depth": ctx.depth,
            }))
        }
    }

    fn ctx_at_depth(depth: u32) -> CallContext {
        let mut ctx = CallContext::new(Uuid::new_v4(), "main_ai_coordinator");
        ctx.depth = depth;
        ctx
    }

    #[tokio::test]
    async fn test_delegation_reaches_target_with_incremented_depth() {
        let directory = Arc::new(AgentDirectory::new());
        let handler = RecordingHandler::new();
        directory.register("budget_agent", handler.clone()).await;

        let tool = DelegateTool::new(directory, vec!["budget_agent".to_string()]);
        let result = tool
            .invoke(
                &ctx_at_depth(0),
                json!({"agent_name": "budget_agent", "message": "update rent"}),
            )
            .await
            .unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        match result {
            InvocationResult::Success { data } => {
                assert_eq!(data["depth"], 1);
                assert_eq!(data["message"], "handled: update rent");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unlisted_target_is_rejected_without_dispatch() {
        let directory = Arc::new(AgentDirectory::new());
        let handler = RecordingHandler::new();
        directory.register("notification_agent", handler.clone()).await;

        // Registered in the directory but absent from the allow-list.
        let tool = DelegateTool::new(directory, vec!["budget_agent".to_string()]);
        let result = tool
            .invoke(
                &ctx_at_depth(0),
                json!({"agent_name": "notification_agent", "message": "ping"}),
            )
            .await
            .unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        match result {
            InvocationResult::Error { message } => {
                assert!(message.contains("notification_agent"));
                assert!(message.contains("not recognized"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_target_in_allow_list_still_fails_cleanly() {
        // Allow-listed but no handler registered: not recognized.
        let directory = Arc::new(AgentDirectory::new());
        let tool = DelegateTool::new(directory, vec!["forecast_agent".to_string()]);

        let result = tool
            .invoke(
                &ctx_at_depth(0),
                json!({"agent_name": "forecast_agent", "message": "plan"}),
            )
            .await
            .unwrap();

        assert!(matches!(result, InvocationResult::Error { .. }));
    }

    #[tokio::test]
    async fn test_depth_limit_blocks_delegation() {
        let directory = Arc::new(AgentDirectory::new());
        let handler = RecordingHandler::new();
        directory.register("budget_agent", handler.clone()).await;

        let tool = AgentCallTool::new(
            directory,
            "budget_agent",
            "call_budget_agent",
            "Calls the Budget Agent.",
        );

        let result = tool
            .invoke(
                &ctx_at_depth(MAX_DELEGATION_DEPTH),
                json!({"message": "update rent"}),
            )
            .await
            .unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        match result {
            InvocationResult::Error { message } => {
                assert!(message.contains("depth limit"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_arguments_are_reported() {
        let directory = Arc::new(AgentDirectory::new());
        let tool = DelegateTool::new(directory, vec!["budget_agent".to_string()]);

        let result = tool
            .invoke(&ctx_at_depth(0), json!({"message": "no target"}))
            .await
            .unwrap();
        assert!(matches!(result, InvocationResult::Error { .. }));

        let result = tool
            .invoke(&ctx_at_depth(0), json!({"agent_name": "budget_agent"}))
            .await
            .unwrap();
        assert!(matches!(result, InvocationResult::Error { .. }));
    }

    #[test]
    fn test_delegate_declaration_enumerates_targets() {
        let allowed = vec!["budget_agent".to_string(), "advisor_agent".to_string()];
        let declaration = delegate_declaration(&allowed);

        assert_eq!(declaration.name, "send_message_to_agent");
        let targets = &declaration.parameters["properties"]["agent_name"]["enum"];
        assert_eq!(targets, &json!(["budget_agent", "advisor_agent"]));
    }
}
