//! Gemini generateContent adapter
//!
//! Projects internal turns onto the two-role wire vocabulary and maps
//! function-calling parts in both directions. Bounded retry/backoff for
//! transient failures lives here, never in the orchestration loop.
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{GatewayReply, InferenceConfig, InferenceGateway, ToolCallRequest, ToolManifest};
use crate::error::AgentError;
use crate::models::{Turn, TurnKind};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Total attempts per round, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Reusable Gemini client (connection-pooled).
pub struct GeminiGateway {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiGateway {
    pub fn new(api_key: String) -> Self {
        let timeout = env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(timeout))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
        }
    }

    /// Point the adapter at a different endpoint (local emulators, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn attempt(
        &self,
        url: &str,
        request: &GenerateRequest,
    ) -> std::result::Result<GatewayReply, AttemptError> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptError {
                retriable: true,
                message: format!("Gemini API request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let retriable = status.as_u16() == 429 || status.is_server_error();
            return Err(AttemptError {
                retriable,
                message: format!("Gemini API returned {}: {}", status, body),
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| AttemptError {
            retriable: false,
            message: format!("Gemini parse error: {}", e),
        })?;

        let candidate = parsed.candidates.into_iter().next().ok_or(AttemptError {
            retriable: false,
            message: "No candidates in Gemini response".to_string(),
        })?;

        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

        // Tool calls may appear in any part of the response; collect them
        // all in emitted order.
        let tool_calls: Vec<ToolCallRequest> = parts
            .iter()
            .filter_map(|p| p.function_call.as_ref())
            .map(|fc| ToolCallRequest {
                name: fc.name.clone(),
                args: fc.args.clone(),
            })
            .collect();

        if !tool_calls.is_empty() {
            return Ok(GatewayReply::ToolCalls(tool_calls));
        }

        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        Ok(GatewayReply::Text(text))
    }
}

#[async_trait]
impl InferenceGateway for GeminiGateway {
    async fn generate(
        &self,
        model: &str,
        turns: &[Turn],
        config: &InferenceConfig,
    ) -> Result<GatewayReply> {
        if self.api_key.is_empty() {
            return Err(AgentError::Gateway(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}/{}:generateContent?key={}", self.base_url, model, self.api_key);
        let request = build_request(turns, config)?;

        info!(model, turns = turns.len(), "Calling Gemini API");

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&url, &request).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.retriable && attempt < MAX_ATTEMPTS => {
                    warn!(attempt, error = %e.message, "Transient Gemini failure, retrying");
                    tokio::time::sleep(Duration::from_millis(250 * 2u64.pow(attempt))).await;
                }
                Err(e) => {
                    error!(attempt, error = %e.message, "Gemini request failed");
                    return Err(AgentError::Gateway(e.message));
                }
            }
        }
    }
}

struct AttemptError {
    retriable: bool,
    message: String,
}

fn build_request(turns: &[Turn], config: &InferenceConfig) -> Result<GenerateRequest> {
    let mut contents = Vec::with_capacity(turns.len());
    for turn in turns {
        contents.push(project_turn(turn)?);
    }

    let generation_config = build_generation_config(config);

    let (tools, tool_config) = match &config.tool_manifest {
        Some(manifest) => (
            Some(vec![manifest.clone()]),
            Some(WireToolConfig {
                function_calling_config: WireFunctionCallingConfig {
                    mode: "AUTO".to_string(),
                },
            }),
        ),
        None => (None, None),
    };

    Ok(GenerateRequest {
        contents,
        system_instruction: WireSystemInstruction {
            parts: vec![WirePart {
                text: Some(config.system_instruction.clone()),
                ..Default::default()
            }],
        },
        generation_config,
        tools,
        tool_config,
    })
}

fn build_generation_config(config: &InferenceConfig) -> Option<WireGenerationConfig> {
    if config.thinking_budget == 0 && config.response_schema.is_none() {
        return None;
    }

    Some(WireGenerationConfig {
        thinking_config: (config.thinking_budget > 0).then(|| WireThinkingConfig {
            thinking_budget: config.thinking_budget,
        }),
        response_mime_type: config
            .response_schema
            .as_ref()
            .map(|_| "application/json".to_string()),
        response_schema: config.response_schema.clone(),
    })
}

/// Project one internal turn into a wire content block. This is the only
/// place the rich turn-kind vocabulary collapses to {user, model}.
fn project_turn(turn: &Turn) -> Result<WireContent> {
    let part = match &turn.kind {
        TurnKind::UserText { text } | TurnKind::ModelText { text } => WirePart {
            text: Some(text.clone()),
            ..Default::default()
        },
        TurnKind::ToolRequest { name, args } => WirePart {
            function_call: Some(WireFunctionCall {
                name: name.clone(),
                args: args.clone(),
            }),
            ..Default::default()
        },
        TurnKind::ToolResult { name, result } => WirePart {
            function_response: Some(WireFunctionResponse {
                name: name.clone(),
                response: serde_json::to_value(result)?,
            }),
            ..Default::default()
        },
    };

    Ok(WireContent {
        role: turn.kind.role().to_string(),
        parts: vec![part],
    })
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<WireContent>,
    system_instruction: WireSystemInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolManifest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<WireToolConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireSystemInstruction {
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<WireThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireToolConfig {
    function_calling_config: WireFunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct WireFunctionCallingConfig {
    mode: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    content: Option<WireContent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvocationResult, ToolDeclaration};
    use serde_json::json;
    use uuid::Uuid;

    fn config_with_tools() -> InferenceConfig {
        InferenceConfig {
            system_instruction: "You are the coordinator".to_string(),
            thinking_budget: 2,
            tool_manifest: Some(ToolManifest {
                function_declarations: vec![ToolDeclaration {
                    name: "call_budget_agent".to_string(),
                    description: "Calls the Budget Agent".to_string(),
                    parameters: json!({
                        "type": "object",
                        "properties": {"message": {"type": "string"}},
                        "required": ["message"]
                    }),
                }],
            }),
            response_schema: None,
        }
    }

    #[test]
    fn test_request_serialization() {
        let user_id = Uuid::new_v4();
        let turns = vec![Turn::new(
            "main_ai_coordinator",
            user_id,
            TurnKind::UserText {
                text: "update rent to 15000 DZD".to_string(),
            },
        )];

        let request = build_request(&turns, &config_with_tools()).unwrap();
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(
            json["contents"][0]["parts"][0]["text"],
            "update rent to 15000 DZD"
        );
        assert_eq!(
            json["tools"][0]["functionDeclarations"][0]["name"],
            "call_budget_agent"
        );
        assert_eq!(
            json["toolConfig"]["functionCallingConfig"]["mode"],
            "AUTO"
        );
        assert_eq!(
            json["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            2
        );
    }

    #[test]
    fn test_tool_round_trip_projection() {
        let user_id = Uuid::new_v4();
        let request_turn = Turn::new(
            "main_ai_coordinator",
            user_id,
            TurnKind::ToolRequest {
                name: "call_budget_agent".to_string(),
                args: json!({"message": "update rent"}),
            },
        );
        let result_turn = Turn::new(
            "main_ai_coordinator",
            user_id,
            TurnKind::ToolResult {
                name: "call_budget_agent".to_string(),
                result: InvocationResult::success(json!({"message": "done"})),
            },
        );

        let request = project_turn(&request_turn).unwrap();
        assert_eq!(request.role, "model");
        assert_eq!(
            request.parts[0].function_call.as_ref().unwrap().name,
            "call_budget_agent"
        );

        let result = project_turn(&result_turn).unwrap();
        assert_eq!(result.role, "user");
        let response = &result.parts[0].function_response.as_ref().unwrap().response;
        assert_eq!(response["type"], "success");
    }

    #[test]
    fn test_generation_config_omitted_when_disabled() {
        let config = InferenceConfig {
            system_instruction: "You are the chatbot".to_string(),
            thinking_budget: 0,
            tool_manifest: None,
            response_schema: None,
        };
        let request = build_request(&[], &config).unwrap();
        assert!(request.generation_config.is_none());
        assert!(request.tools.is_none());
    }

    #[test]
    fn test_response_schema_sets_json_mime() {
        let config = InferenceConfig {
            system_instruction: "You are the budget agent".to_string(),
            thinking_budget: 0,
            tool_manifest: None,
            response_schema: Some(json!({"type": "object"})),
        };
        let request = build_request(&[], &config).unwrap();
        let gen = request.generation_config.unwrap();
        assert_eq!(gen.response_mime_type.as_deref(), Some("application/json"));
        assert!(gen.thinking_config.is_none());
    }
}
