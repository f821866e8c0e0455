//! Onboarding agent
//!
//! Collects the financial profile of a new user one question per turn.
//! Each turn is a single request/execute round: the model must either
//! call `ask_question` (the payload is returned to the caller verbatim)
//! or `finish_onboarding` (the collected profile is persisted).

use crate::finance::{FinanceStore, UserProfile};
use crate::models::{AgentDefinition, CallContext, InvocationResult, ToolDeclaration};
use crate::orchestrator::{Orchestrator, RoundReply};
use crate::registry::AgentTool;
use crate::router::AgentHandler;
use crate::runtime::AgentRuntime;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const NAME: &str = "onboarding_agent";

const SYSTEM_INSTRUCTION: &str = r#"IDENTITY
You are the **Onboarding Agent** in the AION personal finance management system. Your sole purpose is to collect required financial information from new users and hand them off to the main system.

WHAT YOU DO
- Ask clear, structured questions using the ask_question() function, exactly one question per turn.
- Explain why you need each piece of information; be encouraging and patient.
- Call finish_onboarding() once you have all required data and understand the client's financial profile and goals.

REQUIRED DATA (MINIMUM)
1. Monthly Income, Savings, Investments, Debts (4 distinct numbers).
2. User AI preferences (risk_preference, tone, style).
3. Personal info (preferred_currency — default DZD — and location_context).
4. Extra info: goals, habits, budget minimums, and any specific requirements.
5. A 2-4 sentence AI summary of the user.

WHAT YOU DON'T DO
- Don't create budgets; the backend handles this after you finish.
- Don't assume any financial information — always ask the user.
- Don't ask more than one question at once."#;

pub fn definition() -> AgentDefinition {
    AgentDefinition {
        name: NAME.to_string(),
        description: "Collects financial information from new users during onboarding."
            .to_string(),
        model: "gemini-2.0-flash".to_string(),
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        thinking_budget: 0,
    }
}

//
// ================= Tools =================
//

/// Surfaces the model's next question to the caller unchanged.
pub struct AskQuestionTool;

pub fn ask_question_declaration() -> ToolDeclaration {
    ToolDeclaration {
        name: "ask_question".to_string(),
        description: "Asks the user exactly one onboarding question. Use question_type \
                      'choice' with options when a fixed set of answers is expected."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask the user."
                },
                "question_type": {
                    "type": "string",
                    "enum": ["text", "number", "choice"],
                    "description": "Expected answer shape."
                },
                "options": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Choices to present when question_type is 'choice'."
                }
            },
            "required": ["question"]
        }),
    }
}

#[async_trait]
impl AgentTool for AskQuestionTool {
    async fn invoke(&self, _ctx: &CallContext, args: Value) -> Result<InvocationResult> {
        let Some(question) = args.get("question").and_then(Value::as_str) else {
            return Ok(InvocationResult::error("Missing 'question' parameter"));
        };

        Ok(InvocationResult::success(json!({
            "question": question,
            "question_type": args.get("question_type").and_then(Value::as_str).unwrap_or("text"),
            "options": args.get("options").cloned().unwrap_or(Value::Null),
        })))
    }
}

/// Persists the collected profile and ends the onboarding conversation.
pub struct FinishOnboardingTool {
    finance: Arc<FinanceStore>,
}

impl FinishOnboardingTool {
    pub fn new(finance: Arc<FinanceStore>) -> Self {
        Self { finance }
    }
}

pub fn finish_onboarding_declaration() -> ToolDeclaration {
    ToolDeclaration {
        name: "finish_onboarding".to_string(),
        description: "Saves the collected financial profile and completes onboarding. Call \
                      only when every required field has been gathered."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "monthly_income": {"type": "number"},
                "savings": {"type": "number"},
                "investments": {"type": "number"},
                "debts": {"type": "number"},
                "user_ai_preferences": {
                    "type": "object",
                    "description": "Must include risk_preference, tone, and style."
                },
                "personal_info": {
                    "type": "object",
                    "description": "Must include preferred_currency and location_context."
                },
                "extra_info": {
                    "type": "object",
                    "description": "Goals, habits, budget minimums, other details."
                },
                "ai_summary": {
                    "type": "string",
                    "description": "2-4 sentence summary of the user."
                }
            },
            "required": ["monthly_income", "savings", "investments", "debts", "ai_summary"]
        }),
    }
}

#[async_trait]
impl AgentTool for FinishOnboardingTool {
    async fn invoke(&self, ctx: &CallContext, args: Value) -> Result<InvocationResult> {
        let number = |key: &str| args.get(key).and_then(Value::as_f64);

        let (Some(monthly_income), Some(savings), Some(investments), Some(debts)) = (
            number("monthly_income"),
            number("savings"),
            number("investments"),
            number("debts"),
        ) else {
            return Ok(InvocationResult::error(
                "monthly_income, savings, investments, and debts are all required",
            ));
        };

        let profile = UserProfile {
            monthly_income: Some(monthly_income),
            savings: Some(savings),
            investments: Some(investments),
            debts: Some(debts),
            personal_info: args.get("personal_info").cloned(),
            user_ai_preferences: args.get("user_ai_preferences").cloned(),
            extra_info: args.get("extra_info").cloned(),
            ai_summary: args
                .get("ai_summary")
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        self.finance.save_profile(ctx.user_id, profile).await;
        info!(user = %ctx.user_id, "Onboarding profile saved");

        Ok(InvocationResult::success(json!({
            "message": "Onboarding complete. Profile saved.",
            "saved": true,
        })))
    }
}

//
// ================= Handler =================
//

pub struct OnboardingAgent {
    orchestrator: Arc<Orchestrator>,
}

impl OnboardingAgent {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl AgentHandler for OnboardingAgent {
    async fn process(&self, ctx: &CallContext, message: &str) -> InvocationResult {
        // The first turn of a fresh conversation has no user answer yet;
        // the user-role-last invariant supplies the opening turn.
        let new_message = {
            let trimmed = message.trim();
            (!trimmed.is_empty()).then_some(trimmed)
        };

        match self.orchestrator.run_single_round(NAME, ctx, new_message).await {
            Ok(RoundReply::Tool { name, result }) => match (name.as_str(), result) {
                ("ask_question", InvocationResult::Success { data }) => {
                    InvocationResult::success(json!({
                        "stage": "question",
                        "question": data,
                    }))
                }
                ("finish_onboarding", InvocationResult::Success { data }) => {
                    InvocationResult::success(json!({
                        "stage": "completed",
                        "result": data,
                    }))
                }
                (_, InvocationResult::Error { message }) => InvocationResult::error(message),
                (other, _) => {
                    InvocationResult::error(format!("Unexpected onboarding tool '{}'", other))
                }
            },
            Ok(RoundReply::Text(_)) => InvocationResult::error(
                "Agent did not call a function. Please try again.",
            ),
            Err(e) => {
                warn!(user = %ctx.user_id, error = %e, "Onboarding turn failed");
                InvocationResult::error(format!("Onboarding failed: {}", e))
            }
        }
    }
}

pub async fn register(runtime: &AgentRuntime) {
    runtime.registry.get_or_create(definition()).await;

    runtime
        .registry
        .register_tool(NAME, ask_question_declaration(), Arc::new(AskQuestionTool))
        .await;
    runtime
        .registry
        .register_tool(
            NAME,
            finish_onboarding_declaration(),
            Arc::new(FinishOnboardingTool::new(runtime.finance.clone())),
        )
        .await;

    runtime
        .directory
        .register(
            NAME,
            Arc::new(OnboardingAgent::new(runtime.orchestrator.clone())),
        )
        .await;
}
