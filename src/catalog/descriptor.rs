//! 智能体描述符与目录快照
//!
//! AgentDescriptor 对应目录服务返回的一条记录；AgentCatalog 是对话开始时取得的只读快照，
//! 对话过程中不会重新拉取（一致性优先于新鲜度）。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 智能体类型（线上名称沿用目录服务：genai / mcp / a2a / flow）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    /// 经路由器长连接调用的原生智能体
    #[serde(rename = "genai")]
    Native,
    /// MCP 工具服务器
    #[serde(rename = "mcp")]
    ToolServer,
    /// A2A 远程智能体
    #[serde(rename = "a2a")]
    RemoteAgent,
    /// 由多个成员组成的嵌套编排
    #[serde(rename = "flow")]
    Flow,
    /// 目录中出现了本版本不认识的类型
    #[serde(other)]
    Unsupported,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Native => "genai",
            AgentKind::ToolServer => "mcp",
            AgentKind::RemoteAgent => "a2a",
            AgentKind::Flow => "flow",
            AgentKind::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 目录查询过滤条件
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentFilter {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "genai")]
    Native,
    #[serde(rename = "mcp")]
    ToolServer,
    #[serde(rename = "a2a")]
    RemoteAgent,
}

impl AgentFilter {
    /// 查询参数 agent_type 的取值
    pub fn as_query(&self) -> &'static str {
        match self {
            AgentFilter::All => "all",
            AgentFilter::Native => "genai",
            AgentFilter::ToolServer => "mcp",
            AgentFilter::RemoteAgent => "a2a",
        }
    }

    pub fn matches(&self, kind: AgentKind) -> bool {
        match self {
            AgentFilter::All => true,
            AgentFilter::Native => kind == AgentKind::Native,
            AgentFilter::ToolServer => kind == AgentKind::ToolServer,
            AgentFilter::RemoteAgent => kind == AgentKind::RemoteAgent,
        }
    }
}

fn default_active() -> bool {
    true
}

/// 目录中的一条智能体记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: String,
    /// 目录内唯一名称（通常为带随机后缀的别名）
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    /// tool-server / remote-agent 必填
    #[serde(default)]
    pub url: Option<String>,
    /// 能力 schema，仅供 Oracle 使用，编排循环不解析
    #[serde(default, rename = "agent_schema")]
    pub schema: Value,
    /// 仅 flow：按声明顺序的成员 id
    #[serde(default)]
    pub flow: Option<Vec<String>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            url: None,
            schema: Value::Null,
            flow: None,
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_members(mut self, ids: Vec<String>) -> Self {
        self.flow = Some(ids);
        self
    }

    /// flow 成员 id（非 flow 为空）
    pub fn members(&self) -> &[String] {
        self.flow.as_deref().unwrap_or(&[])
    }

    /// 将能力 schema 规整为 Chat Completions 的 function tool，function.name 固定为目录名
    ///
    /// 已是 `{type: function, function: {...}}` 形式的直接沿用；裸 JSON Schema
    /// （`{title?, description?, type, properties}`）包装为 parameters。
    pub fn tool_definition(&self) -> Value {
        if let Some(function) = self.schema.get("function").and_then(Value::as_object) {
            let mut function = function.clone();
            function.insert("name".to_string(), Value::String(self.name.clone()));
            return json!({ "type": "function", "function": function });
        }

        let mut parameters = match &self.schema {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        parameters.remove("title");
        let description = parameters
            .remove("description")
            .and_then(|d| d.as_str().map(String::from))
            .unwrap_or_default();
        parameters
            .entry("type")
            .or_insert_with(|| Value::String("object".to_string()));
        parameters
            .entry("properties")
            .or_insert_with(|| json!({}));

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": description,
                "parameters": parameters,
            }
        })
    }
}

/// 对话级目录快照：只包含活跃描述符，克隆开销为一次 Arc 引用计数
#[derive(Clone, Debug, Default)]
pub struct AgentCatalog {
    agents: Arc<Vec<AgentDescriptor>>,
}

impl AgentCatalog {
    pub fn new(agents: Vec<AgentDescriptor>) -> Self {
        let agents = agents.into_iter().filter(|a| a.is_active).collect();
        Self {
            agents: Arc::new(agents),
        }
    }

    /// 按目录名精确匹配
    pub fn find(&self, name: &str) -> Option<&AgentDescriptor> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// 绑定给 Oracle 的工具定义，顺序与目录一致
    pub fn tool_definitions(&self) -> Vec<Value> {
        self.agents.iter().map(AgentDescriptor::tool_definition).collect()
    }

    /// 按 ids 的顺序挑出成员，构成 flow 的受限子目录；快照中不存在的 id 被忽略
    pub fn restrict_to(&self, ids: &[String]) -> AgentCatalog {
        let by_id: HashMap<&str, &AgentDescriptor> =
            self.agents.iter().map(|a| (a.id.as_str(), a)).collect();
        let members = ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).map(|a| (*a).clone()))
            .collect();
        Self {
            agents: Arc::new(members),
        }
    }
}

impl From<Vec<AgentDescriptor>> for AgentCatalog {
    fn from(agents: Vec<AgentDescriptor>) -> Self {
        Self::new(agents)
    }
}
