//! MCP 工具服务器连接器（Streamable HTTP 传输）
//!
//! 每次调用建立一个临时会话：initialize 握手 -> notifications/initialized -> tools/call，
//! 取第一个内容块的文本作为 payload。会话在所有退出路径上都会拆除（握手失败、调用失败、被取消）。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};

use crate::catalog::AgentKind;
use crate::connectors::{Connector, Invocation, TransportError};
use crate::dispatch::ToolServerConfig;
use crate::trace::TraceRecord;

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_HEADER: &str = "mcp-protocol-version";

pub struct ToolServerConnector {
    client: Client,
}

impl ToolServerConnector {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(timeout_secs))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl Connector for ToolServerConnector {
    type Config = ToolServerConfig;

    async fn invoke(&self, config: ToolServerConfig) -> Invocation {
        let started = Instant::now();
        let trace = TraceRecord::new(
            config.id.clone(),
            config.name.clone(),
            AgentKind::ToolServer,
            config.arguments.clone(),
        )
        .with_url(config.endpoint.clone());

        let mut session = McpSession::open(self.client.clone(), &config.endpoint);
        let outcome = session.call_once(&config.name, config.arguments).await;
        session.close().await;

        let result = outcome.and_then(|result| {
            let text = first_text_block(&result).ok_or_else(|| {
                TransportError::Malformed("tool result has no text content".to_string())
            })?;
            Ok((text, result))
        });

        match result {
            Ok((text, result)) => {
                let is_error = result
                    .get("isError")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if is_error {
                    tracing::warn!(tool = %config.name, "MCP tool reported an error result");
                }
                Invocation {
                    payload: text,
                    trace: trace.complete(!is_error, result, started),
                }
            }
            Err(e) => {
                let message = format!("Unexpected error while invoking MCP tool: {}", e);
                tracing::warn!(tool = %config.name, endpoint = %config.endpoint, "{}", message);
                Invocation::failed(trace, message, started)
            }
        }
    }
}

/// 结果中第一个内容块的文本
fn first_text_block(result: &Value) -> Option<String> {
    result
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(String::from)
}

/// 单次调用的 MCP 会话
struct McpSession {
    client: Client,
    endpoint: String,
    session_id: Option<String>,
    initialized: bool,
    next_id: u64,
    closed: bool,
}

impl McpSession {
    fn open(client: Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            session_id: None,
            initialized: false,
            next_id: 0,
            closed: false,
        }
    }

    async fn call_once(&mut self, tool: &str, arguments: Value) -> Result<Value, TransportError> {
        self.initialize().await?;
        self.request(
            "tools/call",
            json!({ "name": tool, "arguments": arguments }),
        )
        .await
    }

    async fn initialize(&mut self) -> Result<(), TransportError> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;
        tracing::debug!(
            server = ?result.pointer("/serverInfo/name"),
            "MCP session initialized"
        );
        self.initialized = true;
        self.notify("notifications/initialized").await
    }

    fn post(&self, body: &Value) -> RequestBuilder {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(id) = &self.session_id {
            request = request.header(SESSION_HEADER, id);
        }
        if self.initialized {
            request = request.header(PROTOCOL_HEADER, PROTOCOL_VERSION);
        }
        request
    }

    fn capture_session(&mut self, response: &Response) {
        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(id.to_string());
        }
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.next_id += 1;
        let id = self.next_id;
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let response = self.post(&body).send().await?;
        self.capture_session(&response);
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let is_sse = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);
        let text = response.text().await?;
        let message = if is_sse {
            find_sse_response(&text, id)?
        } else {
            serde_json::from_str(&text).map_err(|e| TransportError::Malformed(e.to_string()))?
        };
        rpc_result(message)
    }

    async fn notify(&mut self, method: &str) -> Result<(), TransportError> {
        let body = json!({ "jsonrpc": "2.0", "method": method });
        let response = self.post(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// 服务器分配了会话 id 时发送 DELETE 结束会话；失败只记日志
    async fn close(mut self) {
        self.closed = true;
        let Some(id) = self.session_id.take() else {
            return;
        };
        if let Err(e) = self
            .client
            .delete(&self.endpoint)
            .header(SESSION_HEADER, &id)
            .send()
            .await
        {
            tracing::debug!("MCP session close failed: {}", e);
        }
    }
}

impl Drop for McpSession {
    // 调用被取消时 close 不会执行，这里补发 DELETE
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let Some(id) = self.session_id.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let request = self.client.delete(&self.endpoint).header(SESSION_HEADER, id);
            handle.spawn(async move {
                let _ = request.send().await;
            });
        }
    }
}

/// 从 SSE 文本中找出 id 匹配的 JSON-RPC 响应
fn find_sse_response(body: &str, id: u64) -> Result<Value, TransportError> {
    let mut data = String::new();
    let mut events = Vec::new();
    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        } else if line.trim().is_empty() && !data.is_empty() {
            events.push(std::mem::take(&mut data));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    events
        .iter()
        .filter_map(|e| serde_json::from_str::<Value>(e).ok())
        .find(|m| m.get("id").and_then(Value::as_u64) == Some(id))
        .ok_or_else(|| TransportError::Malformed("no JSON-RPC response in event stream".to_string()))
}

fn rpc_result(message: Value) -> Result<Value, TransportError> {
    if let Some(error) = message.get("error") {
        return Err(TransportError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    message
        .get("result")
        .cloned()
        .ok_or_else(|| TransportError::Malformed("JSON-RPC message has no result".to_string()))
}
