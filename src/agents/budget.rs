//! Budget agent
//!
//! Generates budget operations through a single structured-output model
//! call and applies them to the budget store. No tools are exposed to
//! this agent; the response schema is the contract.

use crate::finance::{Budget, FinanceStore};
use crate::history::HistoryStore;
use crate::models::{AgentDefinition, CallContext, InvocationResult};
use crate::orchestrator::Orchestrator;
use crate::router::AgentHandler;
use crate::runtime::AgentRuntime;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NAME: &str = "budget_agent";

const SYSTEM_INSTRUCTION: &str = r#"IDENTITY
You are the **Budget Agent** in the AION personal finance management system. Your responsibility is to create detailed, realistic, and personalized budgets for users based on their financial data and goals.

OUTPUT FORMAT
You must output a structured JSON response containing:
1. `operations`: a list of budget operations, each with:
   - `operation`: one of "add", "edit", or "delete"
   - `title`: the budget category title (identifies budgets for edit/delete)
   - `budget`: allocated amount (required for add/edit, omit for delete)
   - `spent`: amount spent (optional for add/edit, omit for delete)
   - `description`: Markdown description (required for add/edit, omit for delete)
2. `message`: a conversational message to the user or the Main AI Coordinator.

IMPORTANT: return ONLY the operations needed, not the full state of all budgets. When rebalancing, only return operations for budgets that need to change. Be realistic with amounts. The `spent` field should generally be 0 for new budgets."#;

pub fn definition() -> AgentDefinition {
    AgentDefinition {
        name: NAME.to_string(),
        description: "Generates and manages user budgets and categories.".to_string(),
        model: "gemini-2.5-pro".to_string(),
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        thinking_budget: 1,
    }
}

//
// ================= Structured Output =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BudgetOperationKind {
    Add,
    Edit,
    Delete,
}

/// One add/edit/delete instruction produced by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetOperation {
    pub operation: BudgetOperationKind,
    pub title: String,
    pub budget: Option<f64>,
    pub spent: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetGenerationResponse {
    pub operations: Vec<BudgetOperation>,
    pub message: String,
}

/// JSON schema forcing the operations payload.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "operations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "operation": {"type": "string", "enum": ["add", "edit", "delete"]},
                        "title": {"type": "string"},
                        "budget": {"type": "number"},
                        "spent": {"type": "number"},
                        "description": {"type": "string"}
                    },
                    "required": ["operation", "title"]
                }
            },
            "message": {"type": "string"}
        },
        "required": ["operations", "message"]
    })
}

//
// ================= Handler =================
//

pub struct BudgetAgent {
    orchestrator: Arc<Orchestrator>,
    history: Arc<dyn HistoryStore>,
    finance: Arc<FinanceStore>,
}

impl BudgetAgent {
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

    async fn handle(&self, ctx: &CallContext, message: &str) -> Result<Value> {
        let stored = self.history.history(NAME, ctx.user_id).await?;
        let budget_table = self.finance.budget_table(ctx.user_id).await;

        let mut prompt = String::new();
        if stored.is_empty() {
            prompt.push_str(&self.finance.profile_context(ctx.user_id).await);
            prompt.push('\n');
        }
        prompt.push_str(&format!(
            "CURRENT BUDGETS:\n{}\n\nUSER REQUEST: {}\n\n\
             Analyze the request and return the operations (add/edit/delete) needed to fulfil it.",
            budget_table, message
        ));

        let raw = self
            .orchestrator
            .run_structured_task(NAME, ctx, &prompt, response_schema())
            .await?;

        let parsed: BudgetGenerationResponse = serde_json::from_str(raw.trim())?;

        let mut applied = Vec::with_capacity(parsed.operations.len());
        for op in &parsed.operations {
            match op.operation {
                BudgetOperationKind::Add => {
                    self.finance
                        .add_budget(
                            ctx.user_id,
                            Budget {
                                title: op.title.clone(),
                                budget: op.budget.unwrap_or(0.0),
                                spent: op.spent.unwrap_or(0.0),
                                description: op.description.clone(),
                            },
                        )
                        .await;
                }
                BudgetOperationKind::Edit => {
                    let found = self
                        .finance
                        .edit_budget(
                            ctx.user_id,
                            &op.title,
                            op.budget,
                            op.spent,
                            op.description.clone(),
                        )
                        .await;
                    if !found {
                        // Edits against unknown titles are skipped, not errors.
                        debug!(title = %op.title, "Edit target not found, skipping");
                    }
                }
                BudgetOperationKind::Delete => {
                    let found = self.finance.delete_budget(ctx.user_id, &op.title).await;
                    if !found {
                        debug!(title = %op.title, "Delete target not found, skipping");
                    }
                }
            }
            applied.push(json!({
                "operation": op.operation,
                "title": op.title,
                "budget": op.budget,
                "spent": op.spent,
            }));
        }

        info!(
            user = %ctx.user_id,
            operations = applied.len(),
            "Budget operations applied"
        );

        Ok(json!({
            "message": parsed.message,
            "operations": applied,
        }))
    }
}

#[async_trait]
impl AgentHandler for BudgetAgent {
    async fn process(&self, ctx: &CallContext, message: &str) -> InvocationResult {
        let message = if message.trim().is_empty() {
            "Generate a budget based on available info."
        } else {
            message
        };

        match self.handle(ctx, message).await {
            Ok(data) => InvocationResult::success(data),
            Err(e) => {
                warn!(user = %ctx.user_id, error = %e, "Budget agent failed");
                InvocationResult::error(format!("Budget agent failed: {}", e))
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
            Arc::new(BudgetAgent::new(
                runtime.orchestrator.clone(),
                runtime.history.clone(),
                runtime.finance.clone(),
            )),
        )
        .await;
}
