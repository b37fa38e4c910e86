//! 调用配置：每种描述符类型一个变体，由 Resolver 根据描述符 + 提议参数构建

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::catalog::{AgentCatalog, AgentKind};
use crate::channel::NativeChannel;
use crate::conversation::Message;
use crate::core::OrchestratorEvent;
use crate::oracle::Oracle;

/// 原生通道调用
#[derive(Clone)]
pub struct NativeConfig {
    /// 路由器上的 target id
    pub id: String,
    /// 去掉别名后缀的逻辑名
    pub name: String,
    pub arguments: Value,
    pub channel: Arc<dyn NativeChannel>,
}

/// MCP 工具服务器调用
#[derive(Debug, Clone, PartialEq)]
pub struct ToolServerConfig {
    pub id: String,
    /// 服务器上的工具名
    pub name: String,
    /// base url + 固定后缀（默认 /mcp）
    pub endpoint: String,
    pub arguments: Value,
}

/// A2A 消息片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2aPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// A2A 消息信封：每次调用新生成 messageId
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2aMessage {
    pub role: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub parts: Vec<A2aPart>,
}

impl A2aMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            message_id: uuid::Uuid::new_v4().simple().to_string(),
            parts: vec![A2aPart {
                kind: "text".to_string(),
                text: text.into(),
            }],
        }
    }

    pub fn text(&self) -> &str {
        self.parts.first().map(|p| p.text.as_str()).unwrap_or_default()
    }
}

/// A2A 远程智能体调用
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAgentConfig {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    pub message: A2aMessage,
}

/// 嵌套编排调用
#[derive(Clone)]
pub struct FlowConfig {
    pub id: String,
    pub name: String,
    /// 按 flow 声明顺序排列的成员子目录
    pub members: AgentCatalog,
    pub oracle: Arc<dyn Oracle>,
    pub channel: Arc<dyn NativeChannel>,
    /// 父对话历史，去掉触发本次调用的 assistant 消息
    pub messages: Vec<Message>,
    /// 子循环的嵌套层级
    pub depth: usize,
    /// 父令牌的子令牌：父取消时子循环一并取消
    pub cancel: CancellationToken,
    pub events: Option<mpsc::UnboundedSender<OrchestratorEvent>>,
}

/// 调用配置（封闭的和类型，按变体分派到对应连接器）
#[derive(Clone)]
pub enum InvocationConfig {
    Native(NativeConfig),
    ToolServer(ToolServerConfig),
    RemoteAgent(RemoteAgentConfig),
    Flow(FlowConfig),
}

impl InvocationConfig {
    pub fn kind(&self) -> AgentKind {
        match self {
            InvocationConfig::Native(_) => AgentKind::Native,
            InvocationConfig::ToolServer(_) => AgentKind::ToolServer,
            InvocationConfig::RemoteAgent(_) => AgentKind::RemoteAgent,
            InvocationConfig::Flow(_) => AgentKind::Flow,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            InvocationConfig::Native(c) => &c.name,
            InvocationConfig::ToolServer(c) => &c.name,
            InvocationConfig::RemoteAgent(c) => &c.name,
            InvocationConfig::Flow(c) => &c.name,
        }
    }
}

impl fmt::Debug for NativeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for FlowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("members", &self.members.iter().map(|a| &a.name).collect::<Vec<_>>())
            .field("messages", &self.messages.len())
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for InvocationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationConfig::Native(c) => c.fmt(f),
            InvocationConfig::ToolServer(c) => c.fmt(f),
            InvocationConfig::RemoteAgent(c) => c.fmt(f),
            InvocationConfig::Flow(c) => c.fmt(f),
        }
    }
}
