//! Orchestration loop
//!
//! Drives one agent+user conversation turn: alternate gateway calls and
//! tool dispatches until the model produces a plain-text answer or the
//! round cap is hit. Every intermediate step is persisted before the next
//! gateway call, so sessions are resumable and auditable.

use crate::dispatch::ToolDispatcher;
use crate::error::AgentError;
use crate::gateway::{GatewayReply, InferenceGateway};
use crate::history::HistoryStore;
use crate::models::{
    CallContext, InvocationResult, SessionOutcome, ToolInvocation, Turn, TurnKind, TurnRole,
};
use crate::registry::AgentRegistry;
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Round cap bounding cost and runaway delegation ping-pong.
pub const MAX_TOOL_ROUNDS: u32 = 5;

/// Synthetic continuation text injected when stored history ends with a
/// model turn; the backend requires the last content to carry role=user.
const CONTINUATION_TEXT: &str = "start";

/// Outcome of a single request/execute round (no iteration).
#[derive(Debug, Clone)]
pub enum RoundReply {
    Text(String),
    Tool {
        name: String,
        result: InvocationResult,
    },
}

pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    history: Arc<dyn HistoryStore>,
    gateway: Arc<dyn InferenceGateway>,
    dispatcher: ToolDispatcher,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        history: Arc<dyn HistoryStore>,
        gateway: Arc<dyn InferenceGateway>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(registry.clone());
        Self {
            registry,
            history,
            gateway,
            dispatcher,
        }
    }

    /// Run the bounded tool-calling loop for one agent+user session.
    ///
    /// Pass `None` as the message when resuming a stored conversation
    /// without new user input.
    pub async fn run_turn(
        &self,
        agent_name: &str,
        ctx: &CallContext,
        new_message: Option<&str>,
    ) -> Result<SessionOutcome> {
        let agent = self
            .registry
            .get(agent_name)
            .await
            .ok_or_else(|| AgentError::UnrecognizedAgent(agent_name.to_string()))?;

        let mut turns = self.prepare_turns(agent_name, ctx, new_message).await?;
        let config = self.registry.build_inference_config(&agent).await;

        info!(
            agent = agent_name,
            user = %ctx.user_id,
            depth = ctx.depth,
            "Session starting"
        );

        let mut invocations: Vec<ToolInvocation> = Vec::new();

        for round in 1..=MAX_TOOL_ROUNDS {
            debug!(agent = agent_name, round, "Requesting model turn");

            let reply = self.gateway.generate(&agent.model, &turns, &config).await?;

            match reply {
                GatewayReply::Text(text) => {
                    let turn = self
                        .history
                        .append(agent_name, ctx.user_id, TurnKind::ModelText { text: text.clone() })
                        .await?;
                    turns.push(turn);

                    info!(agent = agent_name, round, "Session complete");
                    return Ok(SessionOutcome {
                        message: text,
                        rounds: round,
                        invocations,
                    });
                }
                GatewayReply::ToolCalls(calls) => {
                    for call in calls {
                        self.dispatch_call(agent_name, ctx, &mut turns, &call.name, call.args.clone())
                            .await?;
                        invocations.push(ToolInvocation {
                            name: call.name,
                            args: call.args,
                        });
                    }
                }
            }
        }

        warn!(
            agent = agent_name,
            rounds = MAX_TOOL_ROUNDS,
            "Iteration cap reached without a final answer"
        );
        Err(AgentError::IterationCapExceeded {
            rounds: MAX_TOOL_ROUNDS,
        })
    }

    /// One request/execute round without iteration, for flows that consume
    /// the first tool outcome directly (onboarding).
    pub async fn run_single_round(
        &self,
        agent_name: &str,
        ctx: &CallContext,
        new_message: Option<&str>,
    ) -> Result<RoundReply> {
        let agent = self
            .registry
            .get(agent_name)
            .await
            .ok_or_else(|| AgentError::UnrecognizedAgent(agent_name.to_string()))?;

        let mut turns = self.prepare_turns(agent_name, ctx, new_message).await?;
        let config = self.registry.build_inference_config(&agent).await;

        let reply = self.gateway.generate(&agent.model, &turns, &config).await?;

        match reply {
            GatewayReply::Text(text) => {
                self.history
                    .append(agent_name, ctx.user_id, TurnKind::ModelText { text: text.clone() })
                    .await?;
                Ok(RoundReply::Text(text))
            }
            GatewayReply::ToolCalls(calls) => {
                // Only the first call matters to single-round flows; the
                // rest would reference state that no longer advances.
                let call = calls.into_iter().next().ok_or_else(|| {
                    AgentError::InvalidResponse("Empty tool-call list".to_string())
                })?;
                let result = self
                    .dispatch_call(agent_name, ctx, &mut turns, &call.name, call.args)
                    .await?;
                Ok(RoundReply::Tool {
                    name: call.name,
                    result,
                })
            }
        }
    }

    /// Single structured-output call: no tools, a response schema, one
    /// gateway round. The prompt and the JSON reply are persisted as
    /// ordinary turns.
    pub async fn run_structured_task(
        &self,
        agent_name: &str,
        ctx: &CallContext,
        prompt: &str,
        response_schema: Value,
    ) -> Result<String> {
        let agent = self
            .registry
            .get(agent_name)
            .await
            .ok_or_else(|| AgentError::UnrecognizedAgent(agent_name.to_string()))?;

        let mut turns = self.prepare_turns(agent_name, ctx, Some(prompt)).await?;

        let config = self
            .registry
            .build_inference_config(&agent)
            .await
            .with_response_schema(response_schema);

        let reply = self.gateway.generate(&agent.model, &turns, &config).await?;

        match reply {
            GatewayReply::Text(text) => {
                let turn = self
                    .history
                    .append(agent_name, ctx.user_id, TurnKind::ModelText { text: text.clone() })
                    .await?;
                turns.push(turn);
                Ok(text)
            }
            GatewayReply::ToolCalls(_) => Err(AgentError::InvalidResponse(
                "Tool call in a structured-output task".to_string(),
            )),
        }
    }

    /// Load stored history, append the new user message when present, and
    /// enforce the user-role-last invariant with a synthetic continuation
    /// turn.
    async fn prepare_turns(
        &self,
        agent_name: &str,
        ctx: &CallContext,
        new_message: Option<&str>,
    ) -> Result<Vec<Turn>> {
        let mut turns = self.history.history(agent_name, ctx.user_id).await?;

        if let Some(message) = new_message {
            let turn = self
                .history
                .append(
                    agent_name,
                    ctx.user_id,
                    TurnKind::UserText {
                        text: message.to_string(),
                    },
                )
                .await?;
            turns.push(turn);
        }

        if turns.last().map(|t| t.kind.role()) != Some(TurnRole::User) {
            let turn = self
                .history
                .append(
                    agent_name,
                    ctx.user_id,
                    TurnKind::UserText {
                        text: CONTINUATION_TEXT.to_string(),
                    },
                )
                .await?;
            turns.push(turn);
        }

        Ok(turns)
    }

    /// Persist the request, dispatch, persist the result. The request turn
    /// is always followed by exactly one result turn for the same name
    /// before the next gateway call.
    async fn dispatch_call(
        &self,
        agent_name: &str,
        ctx: &CallContext,
        turns: &mut Vec<Turn>,
        tool_name: &str,
        args: Value,
    ) -> Result<InvocationResult> {
        info!(agent = agent_name, tool = tool_name, "Dispatching tool call");

        let request = self
            .history
            .append(
                agent_name,
                ctx.user_id,
                TurnKind::ToolRequest {
                    name: tool_name.to_string(),
                    args: args.clone(),
                },
            )
            .await?;
        turns.push(request);

        let result = self.dispatcher.execute(agent_name, tool_name, ctx, args).await;

        let result_turn = self
            .history
            .append(
                agent_name,
                ctx.user_id,
                TurnKind::ToolResult {
                    name: tool_name.to_string(),
                    result: result.clone(),
                },
            )
            .await?;
        turns.push(result_turn);

        Ok(result)
    }
}
