//! Tool dispatch
//!
//! Resolves a tool name against the calling agent's registry entry and
//! executes it with the injected identity context. This is the single
//! boundary where tool faults become error results: whatever goes wrong,
//! the orchestration loop receives an `InvocationResult`, never a crash.

use crate::error::AgentError;
use crate::models::{CallContext, InvocationResult};
use crate::registry::AgentRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ToolDispatcher {
    registry: Arc<AgentRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Execute a tool registered for `agent`. No retries; a missing tool
    /// or a failing implementation comes back as an error result that is
    /// persisted and fed to the model.
    pub async fn execute(
        &self,
        agent: &str,
        tool_name: &str,
        ctx: &CallContext,
        args: Value,
    ) -> InvocationResult {
        let Some(tool) = self.registry.lookup_tool(agent, tool_name).await else {
            warn!(agent, tool = tool_name, "Tool not found");
            return InvocationResult::error(
                AgentError::ToolNotFound {
                    agent: agent.to_string(),
                    tool: tool_name.to_string(),
                }
                .to_string(),
            );
        };

        debug!(agent, tool = tool_name, user = %ctx.user_id, "Executing tool");

        match tool.invoke(ctx, args).await {
            Ok(result) => result,
            Err(e) => {
                warn!(agent, tool = tool_name, error = %e, "Tool execution failed");
                InvocationResult::error(format!("Tool '{}' failed: {}", tool_name, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::models::ToolDeclaration;
    use crate::registry::AgentTool;
    use crate::Result;
    use serde_json::json;
    use uuid::Uuid;

    struct EchoTool;

    #[async_trait::async_trait]
    impl AgentTool for EchoTool {
        async fn invoke(&self, ctx: &CallContext, args: Value) -> Result<InvocationResult> {
            Ok(InvocationResult::success(json!({
                "echo": args,
                "user_id": ctx.user_id.to_string(),
            })))
        }
    }

    struct FaultyTool;

    #[async_trait::async_trait]
    impl AgentTool for FaultyTool {
        async fn invoke(&self, _ctx: &CallContext, _args: Value) -> Result<InvocationResult> {
            Err(AgentError::ToolExecution("backend unreachable".to_string()))
        }
    }

    fn declaration(name: &str) -> ToolDeclaration {
        ToolDeclaration {
            name: name.to_string(),
            description: String::new(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_names_agent_and_tool() {
        let registry = Arc::new(AgentRegistry::new());
        let dispatcher = ToolDispatcher::new(registry);
        let ctx = CallContext::new(Uuid::new_v4(), "chatbot_agent");

        let result = dispatcher
            .execute("chatbot_agent", "missing_tool", &ctx, json!({}))
            .await;

        match result {
            InvocationResult::Error { message } => {
                assert!(message.contains("missing_tool"));
                assert!(message.contains("chatbot_agent"));
            }
            other => panic!("expected error result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_identity_context_is_injected() {
        let registry = Arc::new(AgentRegistry::new());
        registry
            .register_tool("chatbot_agent", declaration("echo"), Arc::new(EchoTool))
            .await;
        let dispatcher = ToolDispatcher::new(registry);

        let user_id = Uuid::new_v4();
        let ctx = CallContext::new(user_id, "chatbot_agent");
        let result = dispatcher
            .execute("chatbot_agent", "echo", &ctx, json!({"message": "hi"}))
            .await;

        match result {
            InvocationResult::Success { data } => {
                assert_eq!(data["user_id"], user_id.to_string());
                assert_eq!(data["echo"]["message"], "hi");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fault_becomes_error_result_not_crash() {
        let registry = Arc::new(AgentRegistry::new());
        registry
            .register_tool("chatbot_agent", declaration("faulty"), Arc::new(FaultyTool))
            .await;
        let dispatcher = ToolDispatcher::new(registry);
        let ctx = CallContext::new(Uuid::new_v4(), "chatbot_agent");

        let result = dispatcher
            .execute("chatbot_agent", "faulty", &ctx, json!({}))
            .await;

        match result {
            InvocationResult::Error { message } => {
                assert!(message.contains("backend unreachable"));
            }
            other => panic!("expected error result, got {:?}", other),
        }
    }
}
