//! Agent registry: definitions plus the per-agent tool table
//!
//! One registry instance is owned by the composition root and shared by
//! handle; there is no process-global state. Definitions are created once
//! (idempotent get-or-create) and updated only when the live record drifts
//! from the canonical one. Tool registration is append-only per process
//! lifetime except for the explicit clear used by tests.

use crate::gateway::{InferenceConfig, ToolManifest};
use crate::models::{AgentDefinition, CallContext, InvocationResult, ToolDeclaration};
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Trait for a callable tool implementation.
///
/// Implementations return `Ok` with a deliberate success-or-error
/// [`InvocationResult`]; an `Err` is an uncaught fault that the dispatcher
/// converts at its boundary.
#[async_trait::async_trait]
pub trait AgentTool: Send + Sync {
    async fn invoke(&self, ctx: &CallContext, args: Value) -> Result<InvocationResult>;
}

struct ToolEntry {
    declaration: ToolDeclaration,
    implementation: Arc<dyn AgentTool>,
}

pub struct AgentRegistry {
    definitions: RwLock<HashMap<String, AgentDefinition>>,
    /// Per-agent tools in registration order. Two agents may register
    /// same-named tools with different implementations.
    tools: RwLock<HashMap<String, Vec<ToolEntry>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Idempotent get-or-create. An existing definition is rewritten only
    /// when the canonical one differs, so live config drift heals on the
    /// next lookup.
    pub async fn get_or_create(&self, def: AgentDefinition) -> AgentDefinition {
        let mut definitions = self.definitions.write().await;
        match definitions.get_mut(&def.name) {
            Some(existing) => {
                if *existing != def {
                    info!(agent = %def.name, "Agent definition drifted, updating");
                    *existing = def.clone();
                }
                existing.clone()
            }
            None => {
                debug!(agent = %def.name, model = %def.model, "Registering agent");
                definitions.insert(def.name.clone(), def.clone());
                def
            }
        }
    }

    pub async fn get(&self, name: &str) -> Option<AgentDefinition> {
        self.definitions.read().await.get(name).cloned()
    }

    /// Register a tool for an agent. Never overwrites an existing name;
    /// re-registering is a no-op.
    pub async fn register_tool(
        &self,
        agent: &str,
        declaration: ToolDeclaration,
        implementation: Arc<dyn AgentTool>,
    ) {
        let mut tools = self.tools.write().await;
        let entries = tools.entry(agent.to_string()).or_default();
        if entries.iter().any(|e| e.declaration.name == declaration.name) {
            return;
        }
        debug!(agent, tool = %declaration.name, "Registering tool");
        entries.push(ToolEntry {
            declaration,
            implementation,
        });
    }

    /// Current tool declarations for an agent, in registration order.
    pub async fn agent_tools(&self, agent: &str) -> Vec<ToolDeclaration> {
        self.tools
            .read()
            .await
            .get(agent)
            .map(|entries| entries.iter().map(|e| e.declaration.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn lookup_tool(&self, agent: &str, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools
            .read()
            .await
            .get(agent)?
            .iter()
            .find(|e| e.declaration.name == name)
            .map(|e| e.implementation.clone())
    }

    /// Manifest attachable to a gateway request; None when the agent has
    /// no registered tools.
    pub async fn build_tool_manifest(&self, agent: &str) -> Option<ToolManifest> {
        let declarations = self.agent_tools(agent).await;
        if declarations.is_empty() {
            None
        } else {
            Some(ToolManifest {
                function_declarations: declarations,
            })
        }
    }

    /// Merge an agent's system instruction, thinking budget, and tool
    /// manifest into a gateway configuration.
    pub async fn build_inference_config(&self, def: &AgentDefinition) -> InferenceConfig {
        InferenceConfig {
            system_instruction: def.system_instruction.clone(),
            thinking_budget: def.thinking_budget,
            tool_manifest: self.build_tool_manifest(&def.name).await,
            response_schema: None,
        }
    }

    /// Drop every tool registered for an agent. Testing/reinitialization
    /// only.
    pub async fn clear_tools(&self, agent: &str) {
        self.tools.write().await.remove(agent);
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NoopTool;

    #[async_trait::async_trait]
    impl AgentTool for NoopTool {
        async fn invoke(&self, _ctx: &CallContext, _args: Value) -> Result<InvocationResult> {
            Ok(InvocationResult::success(json!({"ok": true})))
        }
    }

    fn declaration(name: &str) -> ToolDeclaration {
        ToolDeclaration {
            name: name.to_string(),
            description: format!("{} tool", name),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    fn sample_definition(thinking_budget: u32) -> AgentDefinition {
        AgentDefinition {
            name: "budget_agent".to_string(),
            description: "Generates and manages user budgets".to_string(),
            model: "gemini-2.5-pro".to_string(),
            system_instruction: "You are the Budget Agent".to_string(),
            thinking_budget,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent_and_heals_drift() {
        let registry = AgentRegistry::new();

        let first = registry.get_or_create(sample_definition(1)).await;
        assert_eq!(first.thinking_budget, 1);

        // Unchanged definition comes back as-is.
        let second = registry.get_or_create(sample_definition(1)).await;
        assert_eq!(second, first);

        // Drifted canonical definition replaces the stored one.
        let updated = registry.get_or_create(sample_definition(4)).await;
        assert_eq!(updated.thinking_budget, 4);
        assert_eq!(
            registry.get("budget_agent").await.unwrap().thinking_budget,
            4
        );
    }

    #[tokio::test]
    async fn test_double_registration_leaves_manifest_unchanged() {
        let registry = AgentRegistry::new();

        registry
            .register_tool("chatbot_agent", declaration("edit_user_profile"), Arc::new(NoopTool))
            .await;
        let before = registry.build_tool_manifest("chatbot_agent").await;

        registry
            .register_tool("chatbot_agent", declaration("edit_user_profile"), Arc::new(NoopTool))
            .await;
        let after = registry.build_tool_manifest("chatbot_agent").await;

        assert_eq!(before, after);
        assert_eq!(after.unwrap().function_declarations.len(), 1);
    }

    #[tokio::test]
    async fn test_tools_are_scoped_per_agent() {
        let registry = AgentRegistry::new();

        registry
            .register_tool("chatbot_agent", declaration("send_message_to_agent"), Arc::new(NoopTool))
            .await;

        assert!(registry
            .lookup_tool("chatbot_agent", "send_message_to_agent")
            .await
            .is_some());
        assert!(registry
            .lookup_tool("main_ai_coordinator", "send_message_to_agent")
            .await
            .is_none());
        assert!(registry.agent_tools("main_ai_coordinator").await.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_none_without_tools() {
        let registry = AgentRegistry::new();
        assert!(registry.build_tool_manifest("advisor_agent").await.is_none());

        let def = sample_definition(0);
        registry.get_or_create(def.clone()).await;
        let config = registry.build_inference_config(&def).await;
        assert!(config.tool_manifest.is_none());
        assert_eq!(config.thinking_budget, 0);
        assert_eq!(config.system_instruction, def.system_instruction);
    }

    #[tokio::test]
    async fn test_clear_tools() {
        let registry = AgentRegistry::new();
        registry
            .register_tool("onboarding_agent", declaration("ask_question"), Arc::new(NoopTool))
            .await;
        registry.clear_tools("onboarding_agent").await;
        assert!(registry.agent_tools("onboarding_agent").await.is_empty());
    }
}
