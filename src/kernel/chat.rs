//! Chat Transport
//!
//! Provider-agnostic chat completion with function calling. The three
//! recognized providers (OpenAI, AzureOpenAI, Anthropic) share one
//! internal message shape; each request builder maps it onto the
//! provider's wire format. Streaming parses server-sent events and
//! forwards text deltas to a caller-supplied sink while accumulating the
//! final completion.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::config::ModelProvider;
use crate::constants::{model_tokens, network};
use crate::types::{Result, ScribeError};

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool the model may call, in provider-neutral form.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object
    pub parameters: Value,
}

/// A tool call emitted by the model.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Streaming sink for assistant text deltas.
pub type ChunkSink<'a> = &'a mut (dyn FnMut(&str) + Send);

// =============================================================================
// Backend trait
// =============================================================================

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatCompletion>;

    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        sink: ChunkSink<'_>,
    ) -> Result<ChatCompletion>;

    fn model(&self) -> &str;
}

// =============================================================================
// HTTP backend
// =============================================================================

pub struct HttpChatBackend {
    provider: ModelProvider,
    endpoint: String,
    api_key: SecretString,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl HttpChatBackend {
    pub fn new(
        provider: ModelProvider,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(network::MAX_REDIRECTS))
            .pool_max_idle_per_host(network::POOL_MAX_IDLE_PER_HOST)
            .timeout(Duration::from_secs(network::LLM_TIMEOUT_SECS))
            .build()?;
        let model = model.into();
        Ok(Self {
            provider,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key.into()),
            max_tokens: model_tokens::max_tokens_for(&model),
            model,
            client,
        })
    }

    fn request(&self, stream: bool, messages: &[ChatMessage], tools: &[ToolSpec]) -> reqwest::RequestBuilder {
        match self.provider {
            ModelProvider::OpenAi => self
                .client
                .post(format!("{}/chat/completions", self.endpoint))
                .bearer_auth(self.api_key.expose_secret())
                .json(&openai_body(&self.model, self.max_tokens, stream, messages, tools)),
            ModelProvider::AzureOpenAi => self
                .client
                .post(format!(
                    "{}/openai/deployments/{}/chat/completions?api-version=2024-06-01",
                    self.endpoint, self.model
                ))
                .header("api-key", self.api_key.expose_secret())
                .json(&openai_body(&self.model, self.max_tokens, stream, messages, tools)),
            ModelProvider::Anthropic => self
                .client
                .post(format!("{}/v1/messages", self.endpoint))
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", "2023-06-01")
                .json(&anthropic_body(&self.model, self.max_tokens, stream, messages, tools)),
        }
    }

    async fn send(&self, stream: bool, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<reqwest::Response> {
        let response = self.request(stream, messages, tools).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScribeError::LlmApi(format!(
                "{} returned {}: {}",
                self.provider,
                status,
                body.chars().take(400).collect::<String>()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatCompletion> {
        let response = self.send(false, messages, tools).await?;
        let body: Value = response.json().await?;
        match self.provider {
            ModelProvider::Anthropic => parse_anthropic_completion(&body),
            _ => parse_openai_completion(&body),
        }
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        sink: ChunkSink<'_>,
    ) -> Result<ChatCompletion> {
        let response = self.send(true, messages, tools).await?;
        let mut body = response.bytes_stream();
        let mut buffer = String::new();
        let mut events = match self.provider {
            ModelProvider::Anthropic => SseAccumulator::anthropic(),
            _ => SseAccumulator::openai(),
        };

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ScribeError::LlmApi(format!("stream read failed: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim_end_matches('\r').to_string();
                buffer.drain(..=newline);
                if let Some(data) = line.strip_prefix("data:") {
                    let data = data.trim();
                    if data == "[DONE]" {
                        continue;
                    }
                    let value: Value = match serde_json::from_str(data) {
                        Ok(value) => value,
                        Err(e) => {
                            return Err(ScribeError::LlmApi(format!(
                                "malformed streaming chunk: {}",
                                e
                            )))
                        }
                    };
                    events.feed(&value, &mut *sink);
                }
            }
        }
        Ok(events.finish())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// =============================================================================
// OpenAI wire format (shared by AzureOpenAI)
// =============================================================================

fn openai_body(model: &str, max_tokens: u32, stream: bool, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
    let messages: Vec<Value> = messages
        .iter()
        .map(|m| match m.role {
            ChatRole::System => json!({"role": "system", "content": m.content}),
            ChatRole::User => json!({"role": "user", "content": m.content}),
            ChatRole::Assistant => {
                if m.tool_calls.is_empty() {
                    json!({"role": "assistant", "content": m.content})
                } else {
                    json!({
                        "role": "assistant",
                        "content": if m.content.is_empty() { Value::Null } else { Value::String(m.content.clone()) },
                        "tool_calls": m.tool_calls.iter().map(|c| json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": c.arguments.to_string(),
                            }
                        })).collect::<Vec<_>>(),
                    })
                }
            }
            ChatRole::Tool => json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id,
                "content": m.content,
            }),
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
        "stream": stream,
    });
    if !tools.is_empty() {
        body["tools"] = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tool_choice"] = json!("auto");
    }
    body
}

fn parse_openai_completion(body: &Value) -> Result<ChatCompletion> {
    let message = body
        .pointer("/choices/0/message")
        .ok_or_else(|| ScribeError::LlmApi("no message in completion response".to_string()))?;
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let id = call.get("id")?.as_str()?.to_string();
                    let name = call.pointer("/function/name")?.as_str()?.to_string();
                    let raw = call.pointer("/function/arguments")?.as_str().unwrap_or("{}");
                    let arguments = serde_json::from_str(raw).unwrap_or_else(|_| json!({}));
                    Some(ToolCallRequest { id, name, arguments })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(ChatCompletion { content, tool_calls })
}

// =============================================================================
// Anthropic wire format
// =============================================================================

fn anthropic_body(model: &str, max_tokens: u32, stream: bool, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
    let mut system = String::new();
    let mut converted: Vec<Value> = Vec::new();
    let mut pending_tool_results: Vec<Value> = Vec::new();

    let flush_results = |converted: &mut Vec<Value>, pending: &mut Vec<Value>| {
        if !pending.is_empty() {
            converted.push(json!({"role": "user", "content": std::mem::take(pending)}));
        }
    };

    for m in messages {
        match m.role {
            ChatRole::System => {
                if !system.is_empty() {
                    system.push('\n');
                }
                system.push_str(&m.content);
            }
            ChatRole::User => {
                flush_results(&mut converted, &mut pending_tool_results);
                converted.push(json!({"role": "user", "content": m.content}));
            }
            ChatRole::Assistant => {
                flush_results(&mut converted, &mut pending_tool_results);
                let mut blocks: Vec<Value> = Vec::new();
                if !m.content.is_empty() {
                    blocks.push(json!({"type": "text", "text": m.content}));
                }
                for call in &m.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                converted.push(json!({"role": "assistant", "content": blocks}));
            }
            // consecutive tool results collapse into a single user turn
            ChatRole::Tool => pending_tool_results.push(json!({
                "type": "tool_result",
                "tool_use_id": m.tool_call_id,
                "content": m.content,
            })),
        }
    }
    flush_results(&mut converted, &mut pending_tool_results);

    let mut body = json!({
        "model": model,
        "max_tokens": max_tokens,
        "messages": converted,
        "stream": stream,
    });
    if !system.is_empty() {
        body["system"] = Value::String(system);
    }
    if !tools.is_empty() {
        body["tools"] = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect();
    }
    body
}

fn parse_anthropic_completion(body: &Value) -> Result<ChatCompletion> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ScribeError::LlmApi("no content in messages response".to_string()))?;

    let mut completion = ChatCompletion::default();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                completion
                    .content
                    .push_str(block.get("text").and_then(Value::as_str).unwrap_or_default());
            }
            Some("tool_use") => completion.tool_calls.push(ToolCallRequest {
                id: block.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                name: block.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                arguments: block.get("input").cloned().unwrap_or_else(|| json!({})),
            }),
            _ => {}
        }
    }
    Ok(completion)
}

// =============================================================================
// SSE accumulation
// =============================================================================

enum SseKind {
    OpenAi,
    Anthropic,
}

struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates streamed deltas into a final completion.
struct SseAccumulator {
    kind: SseKind,
    content: String,
    tool_calls: BTreeMap<u64, PartialToolCall>,
}

impl SseAccumulator {
    fn openai() -> Self {
        Self {
            kind: SseKind::OpenAi,
            content: String::new(),
            tool_calls: BTreeMap::new(),
        }
    }

    fn anthropic() -> Self {
        Self {
            kind: SseKind::Anthropic,
            content: String::new(),
            tool_calls: BTreeMap::new(),
        }
    }

    fn feed(&mut self, event: &Value, sink: ChunkSink<'_>) {
        match self.kind {
            SseKind::OpenAi => self.feed_openai(event, sink),
            SseKind::Anthropic => self.feed_anthropic(event, sink),
        }
    }

    fn feed_openai(&mut self, event: &Value, sink: ChunkSink<'_>) {
        let Some(delta) = event.pointer("/choices/0/delta") else {
            return;
        };
        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            self.content.push_str(text);
            sink(text);
        }
        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                let slot = self.tool_calls.entry(index).or_insert_with(|| PartialToolCall {
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                });
                if let Some(id) = call.get("id").and_then(Value::as_str) {
                    slot.id.push_str(id);
                }
                if let Some(name) = call.pointer("/function/name").and_then(Value::as_str) {
                    slot.name.push_str(name);
                }
                if let Some(args) = call.pointer("/function/arguments").and_then(Value::as_str) {
                    slot.arguments.push_str(args);
                }
            }
        }
    }

    fn feed_anthropic(&mut self, event: &Value, sink: ChunkSink<'_>) {
        match event.get("type").and_then(Value::as_str) {
            Some("content_block_start") => {
                let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
                if event.pointer("/content_block/type").and_then(Value::as_str) == Some("tool_use") {
                    self.tool_calls.insert(
                        index,
                        PartialToolCall {
                            id: event
                                .pointer("/content_block/id")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            name: event
                                .pointer("/content_block/name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            arguments: String::new(),
                        },
                    );
                }
            }
            Some("content_block_delta") => {
                let index = event.get("index").and_then(Value::as_u64).unwrap_or(0);
                match event.pointer("/delta/type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = event.pointer("/delta/text").and_then(Value::as_str) {
                            self.content.push_str(text);
                            sink(text);
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some(partial) =
                            event.pointer("/delta/partial_json").and_then(Value::as_str)
                        {
                            if let Some(slot) = self.tool_calls.get_mut(&index) {
                                slot.arguments.push_str(partial);
                            }
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> ChatCompletion {
        let tool_calls = self
            .tool_calls
            .into_values()
            .filter(|c| !c.name.is_empty())
            .map(|c| {
                let arguments = if c.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&c.arguments).unwrap_or_else(|_| json!({}))
                };
                ToolCallRequest {
                    id: c.id,
                    name: c.name,
                    arguments,
                }
            })
            .collect();
        debug!(content_len = self.content.len(), "stream complete");
        ChatCompletion {
            content: self.content,
            tool_calls,
        }
    }
}
