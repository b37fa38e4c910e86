//! A2A 远程智能体连接器：可选读取 agent card，再以 JSON-RPC `message/send` 发送单条用户消息

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::catalog::AgentKind;
use crate::connectors::{Connector, Invocation, TransportError};
use crate::dispatch::RemoteAgentConfig;
use crate::trace::TraceRecord;

const AGENT_CARD_PATH: &str = "/.well-known/agent.json";

pub struct RemoteAgentConnector {
    client: Client,
    resolve_agent_card: bool,
}

impl RemoteAgentConnector {
    pub fn new(timeout_secs: u64, resolve_agent_card: bool) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            resolve_agent_card,
        }
    }

    /// agent card 中的 url；读取失败或缺字段时退回描述符 url
    async fn target_url(&self, endpoint: &str) -> String {
        if !self.resolve_agent_card {
            return endpoint.to_string();
        }
        let card_url = format!("{}{}", endpoint.trim_end_matches('/'), AGENT_CARD_PATH);
        let card = match self.client.get(&card_url).send().await {
            Ok(resp) if resp.status().is_success() => resp.json::<Value>().await.ok(),
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "agent card not available at {}", card_url);
                None
            }
            Err(e) => {
                tracing::debug!("agent card fetch failed: {}", e);
                None
            }
        };
        card.as_ref()
            .and_then(|c| c.get("url"))
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(String::from)
            .unwrap_or_else(|| endpoint.to_string())
    }

    async fn send_message(&self, config: &RemoteAgentConfig) -> Result<Value, TransportError> {
        let target = self.target_url(&config.endpoint).await;
        let body = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": "message/send",
            "params": { "message": config.message },
        });
        let response = self.client.post(&target).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

/// 成功信封中的回复文本：优先任务产物，其次直接返回的消息
fn reply_text(result: &Value) -> Option<&str> {
    let parts = result
        .pointer("/artifacts/0/parts")
        .or_else(|| result.get("parts"))?;
    parts.get(0)?.get("text")?.as_str()
}

/// (payload, success)：成功取回复文本，错误信封取 error.message
fn interpret(envelope: &Value) -> Result<(String, bool), TransportError> {
    if let Some(result) = envelope.get("result") {
        return reply_text(result)
            .map(|t| (t.to_string(), true))
            .ok_or_else(|| TransportError::Malformed("A2A result has no text part".to_string()));
    }
    if let Some(error) = envelope.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Ok((message.to_string(), false));
    }
    Err(TransportError::Malformed(
        "A2A response has neither result nor error".to_string(),
    ))
}

#[async_trait]
impl Connector for RemoteAgentConnector {
    type Config = RemoteAgentConfig;

    async fn invoke(&self, config: RemoteAgentConfig) -> Invocation {
        let started = Instant::now();
        let trace = TraceRecord::new(
            config.id.clone(),
            config.name.clone(),
            AgentKind::RemoteAgent,
            Value::String(config.message.text().to_string()),
        )
        .with_url(config.endpoint.clone());

        let outcome = self
            .send_message(&config)
            .await
            .and_then(|envelope| interpret(&envelope).map(|r| (r, envelope)));

        match outcome {
            Ok(((payload, success), envelope)) => {
                if !success {
                    tracing::warn!(agent = %config.name, "A2A agent returned an error: {}", payload);
                }
                Invocation {
                    payload,
                    trace: trace.complete(success, envelope, started),
                }
            }
            Err(e) => {
                let message = format!("Unexpected error while invoking A2A agent: {}", e);
                tracing::warn!(agent = %config.name, endpoint = %config.endpoint, "{}", message);
                Invocation::failed(trace, message, started)
            }
        }
    }
}
