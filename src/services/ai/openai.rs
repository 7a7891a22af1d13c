use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{LlmProvider, ModelReply};
use crate::models::{OperationRequest, OperationSignature, Role, Turn};

/// Chat-completions client for OpenAI and the API-compatible hosts
/// (Groq, Ollama's `/v1`).
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build LLM HTTP client")?;
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(
        &self,
        system_prompt: &str,
        turns: &[Turn],
        operations: &[OperationSignature],
    ) -> anyhow::Result<ModelReply> {
        let mut body = json!({
            "model": self.model,
            "messages": wire_messages(system_prompt, turns),
            "temperature": 0.3,
        });
        if !operations.is_empty() {
            body["tools"] = wire_tools(operations);
            body["tool_choice"] = json!("auto");
        }

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let resp = request
            .send()
            .await
            .context("failed to call chat completions API")?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .context("failed to read chat completions response")?;

        if !status.is_success() {
            anyhow::bail!(
                "chat completions API error ({}): {}",
                status,
                text.chars().take(500).collect::<String>()
            );
        }

        parse_completion(&text)
    }
}

fn wire_tools(operations: &[OperationSignature]) -> Value {
    operations
        .iter()
        .map(|op| {
            json!({
                "type": "function",
                "function": {
                    "name": op.name,
                    "description": op.description,
                    "parameters": op.parameters,
                }
            })
        })
        .collect()
}

fn wire_messages(system_prompt: &str, turns: &[Turn]) -> Vec<Value> {
    let mut messages = vec![json!({
        "role": "system",
        "content": system_prompt,
    })];

    for turn in turns {
        let message = match turn.role {
            Role::Assistant if !turn.operation_requests.is_empty() => {
                let tool_calls: Vec<Value> = turn
                    .operation_requests
                    .iter()
                    .map(|req| {
                        json!({
                            "id": req.id,
                            "type": "function",
                            "function": {
                                "name": req.name,
                                "arguments": req.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let content = if turn.content.is_empty() {
                    Value::Null
                } else {
                    Value::from(turn.content.clone())
                };
                json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": tool_calls,
                })
            }
            Role::Function => match &turn.call_id {
                Some(call_id) => json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": turn.content,
                }),
                // Results without a call id cannot be paired with a tool call.
                None => json!({
                    "role": "system",
                    "content": format!(
                        "Result of {}: {}",
                        turn.name.as_deref().unwrap_or("operation"),
                        turn.content
                    ),
                }),
            },
            role => json!({
                "role": role.as_str(),
                "content": turn.content,
            }),
        };
        messages.push(message);
    }

    messages
}

fn parse_completion(body: &str) -> anyhow::Result<ModelReply> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).context("failed to parse chat completions response")?;

    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| anyhow::anyhow!("chat completions response had no choices"))?;

    let operation_requests = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            // Unparseable arguments are kept verbatim; validation rejects them later.
            let arguments = serde_json::from_str(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments));
            OperationRequest {
                id: call.id,
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    Ok(ModelReply {
        content: message.content,
        operation_requests,
    })
}
