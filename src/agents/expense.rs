//! Expense manager agent
//!
//! Extracts expense entries from natural language through a structured
//! output call and records them; matching budget categories absorb the
//! spent amounts.

use crate::finance::{Expense, FinanceStore};
use crate::models::{AgentDefinition, CallContext, InvocationResult};
use crate::orchestrator::Orchestrator;
use crate::router::AgentHandler;
use crate::runtime::AgentRuntime;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const NAME: &str = "expense_manager";

const SYSTEM_INSTRUCTION: &str = r#"IDENTITY
You are the **Expense Manager Agent** in the AION personal finance management system. You track and record user expenses.

OUTPUT FORMAT
You must output a structured JSON response containing:
1. `entries`: a list of expenses extracted from the request, each with:
   - `product_name`: what was purchased
   - `amount`: the amount spent (number)
   - `budget_title`: the matching budget category from the provided list, omit when none fits
   - `description`: optional extra detail
2. `message`: a short confirmation for the user or the calling agent.

Categorize each expense against the provided budget categories when a
reasonable match exists. Never invent amounts; extract only what the
request states."#;

pub fn definition() -> AgentDefinition {
    AgentDefinition {
        name: NAME.to_string(),
        description: "Tracks and records user expenses against budget categories.".to_string(),
        model: "gemini-2.5-flash-lite".to_string(),
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        thinking_budget: 0,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseEntry {
    pub product_name: String,
    pub amount: f64,
    pub budget_title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpenseExtractionResponse {
    pub entries: Vec<ExpenseEntry>,
    pub message: String,
}

pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entries": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "product_name": {"type": "string"},
                        "amount": {"type": "number"},
                        "budget_title": {"type": "string"},
                        "description": {"type": "string"}
                    },
                    "required": ["product_name", "amount"]
                }
            },
            "message": {"type": "string"}
        },
        "required": ["entries", "message"]
    })
}

pub struct ExpenseAgent {
    orchestrator: Arc<Orchestrator>,
    finance: Arc<FinanceStore>,
}

impl ExpenseAgent {
    pub fn new(orchestrator: Arc<Orchestrator>, finance: Arc<FinanceStore>) -> Self {
        Self {
            orchestrator,
            finance,
        }
    }

    async fn handle(&self, ctx: &CallContext, message: &str) -> Result<Value> {
        let budget_table = self.finance.budget_table(ctx.user_id).await;
        let prompt = format!(
            "BUDGET CATEGORIES:\n{}\n\nUSER REQUEST: {}\n\n\
             Extract the expenses described in the request.",
            budget_table, message
        );

        let raw = self
            .orchestrator
            .run_structured_task(NAME, ctx, &prompt, response_schema())
            .await?;

        let parsed: ExpenseExtractionResponse = serde_json::from_str(raw.trim())?;

        for entry in &parsed.entries {
            self.finance
                .record_expense(
                    ctx.user_id,
                    Expense {
                        product_name: entry.product_name.clone(),
                        amount: entry.amount,
                        budget_title: entry.budget_title.clone(),
                        description: entry.description.clone(),
                        date: Utc::now(),
                    },
                )
                .await;
        }

        info!(
            user = %ctx.user_id,
            recorded = parsed.entries.len(),
            "Expenses recorded"
        );

        Ok(json!({
            "message": parsed.message,
            "recorded": parsed.entries.len(),
        }))
    }
}

#[async_trait]
impl AgentHandler for ExpenseAgent {
    async fn process(&self, ctx: &CallContext, message: &str) -> InvocationResult {
        match self.handle(ctx, message).await {
            Ok(data) => InvocationResult::success(data),
            Err(e) => {
                warn!(user = %ctx.user_id, error = %e, "Expense manager failed");
                InvocationResult::error(format!("Expense manager failed: {}", e))
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
            Arc::new(ExpenseAgent::new(
                runtime.orchestrator.clone(),
                runtime.finance.clone(),
            )),
        )
        .await;
}
