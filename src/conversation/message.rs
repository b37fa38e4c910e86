//! 对话消息：角色、内容与 Oracle 提议的调用
//!
//! 对话状态只追加、不修改；每条 Message 一经写入即不可变。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（与 Chat Completions API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 消息内容：纯文本或结构化 JSON
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured(Value),
}

impl Content {
    /// 文本形式：Text 原样返回，Structured 序列化为 JSON 字符串
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Structured(v) => v.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Structured(v) => v.is_null(),
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

/// Oracle 提议的一次调用：call_id 用于把工具结果关联回提议
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: Content,
    /// 仅 assistant：按顺序提议的调用
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<ToolCall>,
    /// 仅 tool：对应的 call_id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// 仅 tool：被调用智能体的目录名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: Content) -> Self {
        Self {
            role,
            content,
            calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<Content>) -> Self {
        Self::plain(Role::System, content.into())
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::plain(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::plain(Role::Assistant, content.into())
    }

    /// 带调用提议的 assistant 消息
    pub fn assistant_with_calls(content: impl Into<Content>, calls: Vec<ToolCall>) -> Self {
        Self {
            calls,
            ..Self::plain(Role::Assistant, content.into())
        }
    }

    /// 调用结果：写回对话供下一轮 SELECT 使用
    pub fn tool(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<Content>,
    ) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
            ..Self::plain(Role::Tool, content.into())
        }
    }

    pub fn has_calls(&self) -> bool {
        !self.calls.is_empty()
    }

    pub fn text(&self) -> String {
        self.content.as_text()
    }
}
