//! Main AI Coordinator
//!
//! Backend orchestrator that receives high-level directives from
//! user-facing agents and executes them by commanding specialized worker
//! agents. Never talks to the end user directly; its success payload
//! reports which workers it called.

use crate::error::AgentError;
use crate::models::{AgentDefinition, CallContext, InvocationResult, ToolInvocation};
use crate::orchestrator::Orchestrator;
use crate::router::{AgentCallTool, AgentHandler, DelegateTool};
use crate::runtime::AgentRuntime;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use super::{advisor, budget, expense};

pub const NAME: &str = "main_ai_coordinator";

const SYSTEM_INSTRUCTION: &str = r#"IDENTITY
You are the **Main AI Coordinator**, the backend orchestrator of the AION system. You NEVER communicate with the end user directly; your only interface is with other AI agents (like the Chatbot).

YOUR MISSION
Receive high-level directives from user-facing agents and execute them by commanding specialized worker agents.

OPERATIONAL WORKFLOW
1. Receive a directive (e.g. "The user wants to lower their grocery budget").
2. Decide which worker agent(s) need to be involved.
3. Use send_message_to_agent (or call_budget_agent) to give specific, actionable instructions to the workers.
4. Return a concise status report of the actions taken and their outcomes.

GUIDELINES
- Be directive: tell the worker agents exactly what to do.
- No small talk; be functional and efficient.
- Delegate: never do the math or data updates yourself, always call the specialized agent.
- Your final response is a status report enabling the calling agent to inform the user."#;

/// Workers the coordinator may command through send_message_to_agent.
pub fn allowed_workers() -> Vec<String> {
    vec![
        budget::NAME.to_string(),
        expense::NAME.to_string(),
        advisor::NAME.to_string(),
    ]
}

pub fn definition() -> AgentDefinition {
    AgentDefinition {
        name: NAME.to_string(),
        description: "Central orchestrator that coordinates all specialized agents in the \
                      AION system."
            .to_string(),
        model: "gemini-2.5-flash-lite".to_string(),
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        thinking_budget: 0,
    }
}

/// Worker names commanded during a session, derived from the session's
/// invocation record.
fn agents_called(invocations: &[ToolInvocation]) -> Vec<String> {
    invocations
        .iter()
        .filter_map(|inv| match inv.name.as_str() {
            "call_budget_agent" => Some(budget::NAME.to_string()),
            "send_message_to_agent" => inv
                .args
                .get("agent_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

pub struct CoordinatorAgent {
    orchestrator: Arc<Orchestrator>,
}

impl CoordinatorAgent {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl AgentHandler for CoordinatorAgent {
    async fn process(&self, ctx: &CallContext, message: &str) -> InvocationResult {
        match self.orchestrator.run_turn(NAME, ctx, Some(message)).await {
            Ok(outcome) => {
                let called = agents_called(&outcome.invocations);
                let message = if outcome.message.is_empty() {
                    "I've processed your request.".to_string()
                } else {
                    outcome.message
                };
                InvocationResult::success(json!({
                    "message": message,
                    "agents_called": if called.is_empty() {
                        Value::Null
                    } else {
                        json!(called)
                    },
                }))
            }
            Err(AgentError::IterationCapExceeded { .. }) => InvocationResult::error(
                "Maximum iterations reached. Please try again with a simpler request.",
            ),
            Err(e) => {
                warn!(user = %ctx.user_id, error = %e, "Coordinator session failed");
                InvocationResult::error(format!("Coordinator failed: {}", e))
            }
        }
    }
}

pub async fn register(runtime: &AgentRuntime) {
    runtime.registry.get_or_create(definition()).await;

    let budget_call = AgentCallTool::new(
        runtime.directory.clone(),
        budget::NAME,
        "call_budget_agent",
        "Calls the Budget Agent to generate, update, or rebalance user budgets based on \
         financial data and goals.",
    );
    runtime
        .registry
        .register_tool(NAME, budget_call.declaration(), Arc::new(budget_call))
        .await;

    let delegate = DelegateTool::new(runtime.directory.clone(), allowed_workers());
    runtime
        .registry
        .register_tool(NAME, delegate.declaration(), Arc::new(delegate))
        .await;

    runtime
        .directory
        .register(
            NAME,
            Arc::new(CoordinatorAgent::new(runtime.orchestrator.clone())),
        )
        .await;
}
