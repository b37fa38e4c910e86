//! OpenAI 兼容 Chat Completions Oracle
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! 目录中的能力 schema 已是 function tool 形式，原样放进请求的 tools 字段（create_byot），
//! 响应按 CreateChatCompletionResponse 解析，取 choices[0].message 的 content 与 tool_calls。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionResponse, FunctionCall,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::conversation::{Message, Role, ToolCall};
use crate::oracle::{Oracle, OracleError};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容 Oracle：持有 Client 与 model 名，累计 token 用量
pub struct OpenAiOracle {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    pub usage: TokenUsage,
}

impl OpenAiOracle {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout_secs: u64) -> Self {
        let mut config = OpenAIConfig::new().with_api_base(base_url.trim_end_matches('/'));
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            timeout: Duration::from_secs(timeout_secs),
            usage: TokenUsage::default(),
        }
    }

    /// 累计 token 使用：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    fn request_body(&self, messages: &[Message], tools: &[Value]) -> Result<Value, OracleError> {
        let wire = messages
            .iter()
            .map(to_openai_message)
            .collect::<Result<Vec<_>, _>>()?;
        let mut body = json!({
            "model": self.model,
            "messages": serde_json::to_value(wire).map_err(|e| OracleError::Malformed(e.to_string()))?,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = json!("auto");
        }
        Ok(body)
    }
}

/// Message -> async_openai 请求消息
fn to_openai_message(m: &Message) -> Result<ChatCompletionRequestMessage, OracleError> {
    let message = match m.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(m.text())
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(m.text())
            .build()?
            .into(),
        Role::Tool => ChatCompletionRequestToolMessageArgs::default()
            .content(m.text())
            .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
            .build()?
            .into(),
        Role::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !m.content.is_empty() {
                args.content(m.text());
            }
            if m.has_calls() {
                let calls: Vec<ChatCompletionMessageToolCalls> = m
                    .calls
                    .iter()
                    .map(|c| {
                        ChatCompletionMessageToolCalls::Function(ChatCompletionMessageToolCall {
                            id: c.call_id.clone(),
                            function: FunctionCall {
                                name: c.name.clone(),
                                arguments: c.arguments.to_string(),
                            },
                        })
                    })
                    .collect();
                args.tool_calls(calls);
            }
            args.build()?.into()
        }
    };
    Ok(message)
}

fn parse_arguments(raw: &str) -> Result<Value, OracleError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw)
        .map_err(|e| OracleError::Malformed(format!("tool call arguments: {e}")))
}

/// 响应 -> assistant 消息；只接受 function 类型的调用
fn to_decision(response: CreateChatCompletionResponse) -> Result<Message, OracleError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| OracleError::Malformed("no choices".to_string()))?;

    let mut calls = Vec::new();
    for call in choice.message.tool_calls.unwrap_or_default() {
        match call {
            ChatCompletionMessageToolCalls::Function(call) => calls.push(ToolCall::new(
                call.id,
                call.function.name,
                parse_arguments(&call.function.arguments)?,
            )),
            other => tracing::warn!("ignoring non-function tool call: {:?}", other),
        }
    }
    let content = choice.message.content.unwrap_or_default();
    Ok(Message::assistant_with_calls(content, calls))
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn decide(&self, messages: &[Message], tools: &[Value]) -> Result<Message, OracleError> {
        let body = self.request_body(messages, tools)?;

        let response: CreateChatCompletionResponse =
            tokio::time::timeout(self.timeout, self.client.chat().create_byot(body))
                .await
                .map_err(|_| OracleError::Timeout)??;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }
        to_decision(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(m: &Message) -> Value {
        serde_json::to_value(to_openai_message(m).unwrap()).unwrap()
    }

    #[test]
    fn test_assistant_calls_to_wire() {
        let m = Message::assistant_with_calls(
            "",
            vec![ToolCall::new("call_1", "summarizer_a1b2c3", json!({"text": "x"}))],
        );
        let wire = wire(&m);
        assert_eq!(wire["role"], "assistant");
        assert!(wire.get("content").map_or(true, Value::is_null));
        assert_eq!(wire["tool_calls"][0]["id"], "call_1");
        assert_eq!(wire["tool_calls"][0]["type"], "function");
        assert_eq!(wire["tool_calls"][0]["function"]["arguments"], r#"{"text":"x"}"#);
    }

    #[test]
    fn test_tool_message_to_wire() {
        let wire = wire(&Message::tool("call_1", "summarizer_a1b2c3", "done"));
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_1");
        assert_eq!(wire["content"], "done");
    }

    #[test]
    fn test_request_body_omits_empty_tools() {
        let oracle = OpenAiOracle::new("http://localhost/v1/", "gpt-4o-mini", None, 5);
        let body = oracle.request_body(&[Message::user("hi")], &[]).unwrap();
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[test]
    fn test_response_maps_function_calls() {
        let response: CreateChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "call_7", "type": "function",
                        "function": {"name": "summarizer_a1b2c3", "arguments": "{\"text\":\"long\"}"}}]
                }
            }]
        }))
        .unwrap();
        let decision = to_decision(response).unwrap();
        assert_eq!(decision.calls.len(), 1);
        assert_eq!(decision.calls[0].call_id, "call_7");
        assert_eq!(decision.calls[0].arguments, json!({"text": "long"}));
        assert_eq!(decision.text(), "");
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("").unwrap(), json!({}));
        assert_eq!(parse_arguments(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(matches!(parse_arguments("{oops"), Err(OracleError::Malformed(_))));
    }
}
