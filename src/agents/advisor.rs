//! Advisor agent
//!
//! Product recommendations, purchase analysis, and product comparisons
//! with budget-aware guidance. Stateless: each request is a single
//! gateway call carrying the full financial context; exchanges are
//! recorded as advisor sessions rather than conversation turns.

use crate::finance::{AdvisorSession, FinanceStore};
use crate::gateway::{GatewayReply, InferenceGateway};
use crate::models::{AgentDefinition, CallContext, InvocationResult, Turn, TurnKind};
use crate::registry::AgentRegistry;
use crate::router::AgentHandler;
use crate::runtime::AgentRuntime;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const NAME: &str = "advisor_agent";

const SYSTEM_INSTRUCTION: &str = r#"IDENTITY
You are the **Advisor Agent** in the AION personal finance management system. Your role is to provide smart product recommendations and purchase guidance.

CRITICAL RULES
- ALWAYS consider the user's budget constraints
- If a purchase would cause overspending, suggest budget-friendly alternatives
- Analyze the user's spending patterns from their expense history
- Provide clear, actionable advice in Markdown format
- Prioritize the user's financial health over making a purchase

OUTPUT FORMAT
Use Markdown with sections like "Analysis", "Recommendation", "Alternatives", including specific price points and budget impact."#;

pub fn definition() -> AgentDefinition {
    AgentDefinition {
        name: NAME.to_string(),
        description: "Provides smart product recommendations and purchase guidance.".to_string(),
        model: "gemini-2.5-flash".to_string(),
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        thinking_budget: 0,
    }
}

//
// ================= Task Routing =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisorTask {
    Recommend,
    Analyze,
    Compare,
}

impl AdvisorTask {
    pub fn label(&self) -> &'static str {
        match self {
            AdvisorTask::Recommend => "recommend",
            AdvisorTask::Analyze => "analyze",
            AdvisorTask::Compare => "compare",
        }
    }
}

const COMPARE_KEYWORDS: &[&str] = &["compare", "versus", " vs ", "vs.", "between"];
const ANALYZE_KEYWORDS: &[&str] = &[
    "should i buy",
    "can i afford",
    "is it worth",
    "good idea",
];

/// Route a request to the advisor task it describes. Defaults to
/// recommendation when nothing more specific matches.
pub fn classify_task(message: &str) -> AdvisorTask {
    let lowered = message.to_lowercase();

    if COMPARE_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        AdvisorTask::Compare
    } else if ANALYZE_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        AdvisorTask::Analyze
    } else {
        AdvisorTask::Recommend
    }
}

fn task_framing(task: AdvisorTask) -> &'static str {
    match task {
        AdvisorTask::Recommend => {
            "TASK: Provide product recommendations that fit the user's budget and financial \
             situation. If the request is vague, offer a range of options at different price \
             points."
        }
        AdvisorTask::Analyze => {
            "TASK: Analyze whether this purchase is financially wise. Consider the budget \
             category it would come from, whether it causes overspending, cheaper \
             alternatives, and need versus want. Conclude with a clear recommendation: \
             \"Go ahead\", \"Consider alternatives\", or \"Not recommended right now\"."
        }
        AdvisorTask::Compare => {
            "TASK: Compare the products mentioned and recommend the best option considering \
             price, the user's budget constraints, features, and long-term value. Provide a \
             structured comparison with pros/cons and a clear recommendation."
        }
    }
}

//
// ================= Handler =================
//

pub struct AdvisorAgent {
    registry: Arc<AgentRegistry>,
    gateway: Arc<dyn InferenceGateway>,
    finance: Arc<FinanceStore>,
}

impl AdvisorAgent {
    pub fn new(
        registry: Arc<AgentRegistry>,
        gateway: Arc<dyn InferenceGateway>,
        finance: Arc<FinanceStore>,
    ) -> Self {
        Self {
            registry,
            gateway,
            finance,
        }
    }

    async fn handle(&self, ctx: &CallContext, message: &str) -> Result<Value> {
        let agent = self
            .registry
            .get(NAME)
            .await
            .unwrap_or_else(definition);
        let task = classify_task(message);

        let prompt = format!(
            "{}\nUSER REQUEST: {}\n\n{}",
            self.finance.financial_context(ctx.user_id).await,
            message,
            task_framing(task)
        );

        let config = self.registry.build_inference_config(&agent).await;
        let turns = vec![Turn::new(
            NAME,
            ctx.user_id,
            TurnKind::UserText { text: prompt },
        )];

        let reply = self.gateway.generate(&agent.model, &turns, &config).await?;
        let advice = match reply {
            GatewayReply::Text(text) => text,
            GatewayReply::ToolCalls(_) => {
                return Err(crate::error::AgentError::InvalidResponse(
                    "Advisor has no tools to call".to_string(),
                ))
            }
        };

        self.finance
            .record_advisor_session(
                ctx.user_id,
                AdvisorSession {
                    query_type: task.label().to_string(),
                    user_query: message.to_string(),
                    ai_response: advice.clone(),
                    created_at: Utc::now(),
                },
            )
            .await;

        info!(user = %ctx.user_id, task = task.label(), "Advisor session recorded");

        Ok(json!({
            "advice": advice,
            "query_type": task.label(),
        }))
    }
}

#[async_trait]
impl AgentHandler for AdvisorAgent {
    async fn process(&self, ctx: &CallContext, message: &str) -> InvocationResult {
        match self.handle(ctx, message).await {
            Ok(data) => InvocationResult::success(data),
            Err(e) => {
                warn!(user = %ctx.user_id, error = %e, "Advisor failed");
                InvocationResult::error(format!("Failed to generate advice: {}", e))
            }
        }
    }
}

pub async fn register(runtime: &AgentRuntime) {
    runtime.registry.get_or_create(definition()).await;
    runtime
        .directory
        .register(
            NAME,
            Arc::new(AdvisorAgent::new(
                runtime.registry.clone(),
                runtime.gateway.clone(),
                runtime.finance.clone(),
            )),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ScriptedGateway;
    use uuid::Uuid;

    #[test]
    fn test_task_classification() {
        assert_eq!(
            classify_task("Compare iPhone vs Samsung"),
            AdvisorTask::Compare
        );
        assert_eq!(
            classify_task("Should I buy this laptop for 50000?"),
            AdvisorTask::Analyze
        );
        assert_eq!(
            classify_task("Can I afford a new TV?"),
            AdvisorTask::Analyze
        );
        assert_eq!(
            classify_task("Recommend a phone under 30000"),
            AdvisorTask::Recommend
        );
    }

    #[tokio::test]
    async fn test_advice_recorded_as_session() {
        let registry = Arc::new(AgentRegistry::new());
        registry.get_or_create(definition()).await;
        let gateway = Arc::new(ScriptedGateway::new(vec![GatewayReply::Text(
            "## Analysis\nGo ahead.".to_string(),
        )]));
        let finance = Arc::new(FinanceStore::new());
        let agent = AdvisorAgent::new(registry, gateway, finance.clone());

        let user_id = Uuid::new_v4();
        let ctx = CallContext::new(user_id, NAME);
        let result = agent.process(&ctx, "Should I buy this laptop for 50000?").await;

        match result {
            InvocationResult::Success { data } => {
                assert_eq!(data["query_type"], "analyze");
                assert!(data["advice"].as_str().unwrap().contains("Go ahead"));
            }
            other => panic!("expected success, got {:?}", other),
        }

        let sessions = finance.advisor_sessions(user_id).await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].query_type, "analyze");
    }
}
