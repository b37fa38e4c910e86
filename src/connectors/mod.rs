//! 协议连接器
//!
//! 四种协议统一为 `invoke(config) -> Invocation`，且**从不返回错误**：
//! 任何传输/协议失败都在连接器内部转为 (错误文本, success=false 的轨迹)，单个远端失败不会中断循环或父 flow。
//! ConnectorSet 是按变体分派的策略表；flow 连接器需要回调编排循环本身，由 Orchestrator 现场构造。

pub mod flow;
pub mod native;
pub mod remote_agent;
pub mod tool_server;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::channel::ChannelError;
use crate::config::ConnectorsSection;
use crate::dispatch::{NativeConfig, RemoteAgentConfig, ToolServerConfig};
use crate::trace::TraceRecord;

pub use flow::FlowConnector;
pub use native::NativeConnector;
pub use remote_agent::RemoteAgentConnector;
pub use tool_server::ToolServerConnector;

/// 连接器内部的传输/协议错误，只用于生成错误文本
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("remote error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// 一次调用的结果：写回对话的文本 + 轨迹记录
#[derive(Debug, Clone)]
pub struct Invocation {
    pub payload: String,
    pub trace: TraceRecord,
}

impl Invocation {
    /// 失败结果：错误文本同时作为 payload 与轨迹输出
    pub fn failed(trace: TraceRecord, message: String, started: Instant) -> Self {
        let trace = trace.fail(&message, started);
        Self {
            payload: message,
            trace,
        }
    }
}

/// 协议连接器：每个实现只接受自己变体的配置
#[async_trait]
pub trait Connector: Send + Sync {
    type Config: Send + 'static;

    async fn invoke(&self, config: Self::Config) -> Invocation;
}

/// 叶子协议的策略表
#[derive(Clone)]
pub struct ConnectorSet {
    pub native: Arc<dyn Connector<Config = NativeConfig>>,
    pub tool_server: Arc<dyn Connector<Config = ToolServerConfig>>,
    pub remote_agent: Arc<dyn Connector<Config = RemoteAgentConfig>>,
}

impl ConnectorSet {
    pub fn from_config(cfg: &ConnectorsSection) -> Self {
        Self {
            native: Arc::new(NativeConnector),
            tool_server: Arc::new(ToolServerConnector::new(cfg.tool_server.timeout_secs)),
            remote_agent: Arc::new(RemoteAgentConnector::new(
                cfg.remote_agent.timeout_secs,
                cfg.remote_agent.resolve_agent_card,
            )),
        }
    }
}

impl Default for ConnectorSet {
    fn default() -> Self {
        Self::from_config(&ConnectorsSection::default())
    }
}

/// payload 文本：字符串原样，其它 JSON 序列化
pub fn payload_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 截断预览（按字符）
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 每次调用输出一条结构化审计日志（JSON）
pub fn audit(trace: &TraceRecord) {
    let audit = serde_json::json!({
        "event": "agent_audit",
        "agent": trace.name,
        "kind": trace.kind.as_str(),
        "success": trace.success,
        "duration_ms": trace.duration_ms,
        "nested": trace.nested().map(|n| n.len()),
        "input_preview": preview(&trace.input.to_string(), 200),
    });
    tracing::info!(audit = %audit, "agent");
}
