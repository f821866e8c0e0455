//! Chatbot agent
//!
//! Primary conversational interface. Runs the full orchestration loop
//! with profile editing and delegation tools, injects the user's
//! financial profile into the first message of a fresh conversation,
//! and strips HTML tags from the final reply.

use crate::error::AgentError;
use crate::finance::{FinanceStore, ProfileUpdate};
use crate::history::HistoryStore;
use crate::models::{AgentDefinition, CallContext, InvocationResult, ToolDeclaration};
use crate::orchestrator::Orchestrator;
use crate::registry::AgentTool;
use crate::router::{AgentCallTool, AgentHandler};
use crate::runtime::AgentRuntime;
use crate::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use super::{advisor, coordinator, expense};

pub const NAME: &str = "chatbot_agent";

const SYSTEM_INSTRUCTION: &str = r#"You are the **Chatbot Agent** in the AION personal finance management system, the primary conversational interface for users.

YOUR ROLE
- Engage in natural, friendly conversations and answer questions about the user's finances.
- Help users update their profile using the edit_user_profile tool.
- Delegate complex tasks to specialized agents using the call tools.

TOOL RULES
1. edit_user_profile: REQUIRED when the user updates income, savings, investments, debts, or preferences.
2. call_expense_manager: REQUIRED when the user mentions expenses, purchases, or spending.
3. call_main_coordinator: REQUIRED for ALL budget operations (create, update, delete, modify categories).
4. call_advisor: REQUIRED for product advice, comparisons, or affordability questions.

When a message matches a tool's purpose, call that tool immediately; do not announce that you will. After a tool executes, explain the result naturally.

OUTPUT FORMAT
Respond in plain text with optional markdown. NEVER include HTML tags."#;

pub fn definition() -> AgentDefinition {
    AgentDefinition {
        name: NAME.to_string(),
        description: "Primary conversational interface for users in the AION system."
            .to_string(),
        model: "gemini-2.5-flash-lite".to_string(),
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        thinking_budget: 0,
    }
}

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]+>").expect("valid regex literal");
}

/// Remove HTML tags the model occasionally emits despite instructions.
pub fn strip_html_tags(text: &str) -> String {
    HTML_TAG.replace_all(text, "").trim().to_string()
}

//
// ================= edit_user_profile =================
//

pub struct EditProfileTool {
    finance: Arc<FinanceStore>,
}

impl EditProfileTool {
    pub fn new(finance: Arc<FinanceStore>) -> Self {
        Self { finance }
    }
}

pub fn edit_profile_declaration() -> ToolDeclaration {
    ToolDeclaration {
        name: "edit_user_profile".to_string(),
        description: "Edits the user's profile information including financial data and \
                      preferences. Use this when the user wants to update their income, \
                      savings, investments, debts, or personal preferences."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "monthly_income": {"type": "number", "description": "The user's monthly income amount."},
                "savings": {"type": "number", "description": "The user's current savings amount."},
                "investments": {"type": "number", "description": "The user's current investments amount."},
                "debts": {"type": "number", "description": "The user's current debts amount."},
                "personal_info": {"type": "object", "description": "Personal information (e.g. preferred_currency, location_context)."},
                "user_ai_preferences": {"type": "object", "description": "AI preferences (e.g. tone, style)."},
                "extra_info": {"type": "object", "description": "Additional information."}
            },
            "required": []
        }),
    }
}

#[async_trait]
impl AgentTool for EditProfileTool {
    async fn invoke(&self, ctx: &CallContext, args: Value) -> Result<InvocationResult> {
        let update: ProfileUpdate = serde_json::from_value(args)
            .map_err(|e| AgentError::ToolExecution(format!("Invalid profile fields: {}", e)))?;

        let profile = self.finance.update_profile(ctx.user_id, update).await;

        Ok(InvocationResult::success(json!({
            "message": "Profile updated successfully",
            "profile": profile,
        })))
    }
}

//
// ================= Handler =================
//

pub struct ChatbotAgent {
    orchestrator: Arc<Orchestrator>,
    history: Arc<dyn HistoryStore>,
    finance: Arc<FinanceStore>,
}

impl ChatbotAgent {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        history: Arc<dyn HistoryStore>,
        finance: Arc<FinanceStore>,
    ) -> Self {
        Self {
            orchestrator,
            history,
            finance,
        }
    }
}

#[async_trait]
impl AgentHandler for ChatbotAgent {
    async fn process(&self, ctx: &CallContext, message: &str) -> InvocationResult {
        // Inject the financial profile into the opening message of a
        // fresh conversation so the model knows who it is talking to.
        let stored = match self.history.history(NAME, ctx.user_id).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!(user = %ctx.user_id, error = %e, "History load failed");
                return InvocationResult::error(format!("Chatbot failed: {}", e));
            }
        };

        let message = if stored.is_empty() {
            format!(
                "{}\n\nUSER MESSAGE: {}",
                self.finance.profile_context(ctx.user_id).await,
                message
            )
        } else {
            message.to_string()
        };

        match self.orchestrator.run_turn(NAME, ctx, Some(&message)).await {
            Ok(outcome) => InvocationResult::success(json!({
                "message": strip_html_tags(&outcome.message),
            })),
            Err(AgentError::IterationCapExceeded { .. }) => InvocationResult::error(
                "I'm having trouble processing your request. Could you please try rephrasing it?",
            ),
            Err(e) => {
                warn!(user = %ctx.user_id, error = %e, "Chatbot turn failed");
                InvocationResult::error(format!("Chatbot failed: {}", e))
            }
        }
    }
}

pub async fn register(runtime: &AgentRuntime) {
    runtime.registry.get_or_create(definition()).await;

    runtime
        .registry
        .register_tool(
            NAME,
            edit_profile_declaration(),
            Arc::new(EditProfileTool::new(runtime.finance.clone())),
        )
        .await;

    let coordinator_call = AgentCallTool::new(
        runtime.directory.clone(),
        coordinator::NAME,
        "call_main_coordinator",
        "Calls the Main AI Coordinator to handle complex tasks that require coordination \
         between multiple agents or specialized financial operations (budgets, forecasts, \
         etc.). Use this when the user's request involves budgets, financial planning, or \
         tasks beyond simple conversation.",
    );
    runtime
        .registry
        .register_tool(NAME, coordinator_call.declaration(), Arc::new(coordinator_call))
        .await;

    let expense_call = AgentCallTool::new(
        runtime.directory.clone(),
        expense::NAME,
        "call_expense_manager",
        "Calls the Expense Manager Agent to track and record user expenses. Use this when \
         the user mentions spending money, making a purchase, or wants to track an expense.",
    );
    runtime
        .registry
        .register_tool(NAME, expense_call.declaration(), Arc::new(expense_call))
        .await;

    let advisor_call = AgentCallTool::new(
        runtime.directory.clone(),
        advisor::NAME,
        "call_advisor",
        "Calls the Advisor Agent for product recommendations and purchase guidance. Use \
         this when the user asks about buying products, needs shopping advice, wants \
         product comparisons, or asks if they can afford something.",
    );
    runtime
        .registry
        .register_tool(NAME, advisor_call.declaration(), Arc::new(advisor_call))
        .await;

    runtime
        .directory
        .register(
            NAME,
            Arc::new(ChatbotAgent::new(
                runtime.orchestrator.clone(),
                runtime.history.clone(),
                runtime.finance.clone(),
            )),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayReply, ScriptedGateway};
    use crate::history::InMemoryHistoryStore;
    use crate::models::TurnKind;
    use crate::registry::AgentRegistry;
    use uuid::Uuid;

    #[test]
    fn test_strip_html_tags() {
        assert_eq!(
            strip_html_tags("<div>Your budget is <b>fine</b></div>"),
            "Your budget is fine"
        );
        assert_eq!(
            strip_html_tags("**bold** stays, <p>tags go</p>"),
            "**bold** stays, tags go"
        );
        assert_eq!(strip_html_tags("no markup at all"), "no markup at all");
    }

    #[tokio::test]
    async fn test_profile_context_injected_on_first_message_only() {
        let registry = Arc::new(AgentRegistry::new());
        registry.get_or_create(definition()).await;
        let history = Arc::new(InMemoryHistoryStore::new());
        let gateway = Arc::new(ScriptedGateway::new(vec![
            GatewayReply::Text("Hello!".to_string()),
            GatewayReply::Text("Welcome back!".to_string()),
        ]));
        let finance = Arc::new(FinanceStore::new());
        let orchestrator = Arc::new(Orchestrator::new(
            registry,
            history.clone(),
            gateway,
        ));
        let agent = ChatbotAgent::new(orchestrator, history.clone(), finance);

        let user_id = Uuid::new_v4();
        let ctx = CallContext::new(user_id, NAME);
        agent.process(&ctx, "hi there").await;
        agent.process(&ctx, "what can you do?").await;

        let turns = history.history(NAME, user_id).await.unwrap();
        let user_texts: Vec<&str> = turns
            .iter()
            .filter_map(|t| match &t.kind {
                TurnKind::UserText { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(user_texts.len(), 2);
        assert!(user_texts[0].contains("USER FINANCIAL PROFILE"));
        assert!(user_texts[0].contains("hi there"));
        assert_eq!(user_texts[1], "what can you do?");
    }

    #[tokio::test]
    async fn test_edit_profile_tool_updates_store() {
        let finance = Arc::new(FinanceStore::new());
        let tool = EditProfileTool::new(finance.clone());
        let user_id = Uuid::new_v4();
        let ctx = CallContext::new(user_id, NAME);

        let result = tool
            .invoke(&ctx, json!({"monthly_income": 75000.0}))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(finance.profile(user_id).await.monthly_income, Some(75000.0));
    }
}
