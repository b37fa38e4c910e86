//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MASTER__*` 覆盖（双下划线表示嵌套，如 `MASTER__ORACLE__MODEL=gpt-4o`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::catalog::AgentFilter;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub directory: DirectorySection,
    pub channel: ChannelSection,
    pub oracle: OracleSection,
    pub orchestrator: OrchestratorSection,
    pub connectors: ConnectorsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [directory] 段：目录服务地址与认证；设置 catalog_path 时改为读本地 JSON
#[derive(Debug, Clone, Deserialize)]
pub struct DirectorySection {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub user_id: Option<String>,
    /// all / genai / mcp / a2a
    #[serde(default)]
    pub filter: AgentFilter,
    pub catalog_path: Option<PathBuf>,
    #[serde(default = "default_directory_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_directory_timeout_secs() -> u64 {
    30
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            user_id: None,
            filter: AgentFilter::All,
            catalog_path: None,
            timeout_secs: default_directory_timeout_secs(),
        }
    }
}

/// [channel] 段：原生智能体路由器（WebSocket）
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSection {
    /// 未设置时原生智能体调用全部软失败
    pub ws_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_channel_timeout_secs")]
    pub request_timeout_secs: u64,
    /// serve 模式下在路由器上注册的名字
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    #[serde(default = "default_agent_description")]
    pub agent_description: String,
}

fn default_channel_timeout_secs() -> u64 {
    60
}

fn default_agent_name() -> String {
    "MasterAgent".to_string()
}

fn default_agent_description() -> String {
    "Master agent that orchestrates other agents".to_string()
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            ws_url: None,
            api_key: None,
            request_timeout_secs: default_channel_timeout_secs(),
            agent_name: default_agent_name(),
            agent_description: default_agent_description(),
        }
    }
}

/// [oracle] 段：OpenAI 兼容决策后端
#[derive(Debug, Clone, Deserialize)]
pub struct OracleSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
    pub system_prompt: Option<String>,
    /// 0 表示首次失败即终止对话
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_oracle_timeout_secs() -> u64 {
    60
}

fn default_initial_backoff_ms() -> u64 {
    500
}

impl OracleSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_oracle_timeout_secs(),
            system_prompt: None,
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// [orchestrator] 段：循环上限
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    /// 单轮对话最多派发次数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// flow 最大嵌套层级
    #[serde(default = "default_max_flow_depth")]
    pub max_flow_depth: usize,
}

fn default_max_iterations() -> usize {
    20
}

fn default_max_flow_depth() -> usize {
    4
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_flow_depth: default_max_flow_depth(),
        }
    }
}

/// [connectors] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConnectorsSection {
    #[serde(default)]
    pub tool_server: ToolServerSection,
    #[serde(default)]
    pub remote_agent: RemoteAgentSection,
}

/// [connectors.tool_server] 段：MCP 端点后缀与超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolServerSection {
    #[serde(default = "default_endpoint_suffix")]
    pub endpoint_suffix: String,
    #[serde(default = "default_tool_server_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint_suffix() -> String {
    "/mcp".to_string()
}

fn default_tool_server_timeout_secs() -> u64 {
    30
}

impl Default for ToolServerSection {
    fn default() -> Self {
        Self {
            endpoint_suffix: default_endpoint_suffix(),
            timeout_secs: default_tool_server_timeout_secs(),
        }
    }
}

/// [connectors.remote_agent] 段：A2A 超时与是否先读 agent card
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAgentSection {
    #[serde(default = "default_remote_agent_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_resolve_agent_card")]
    pub resolve_agent_card: bool,
}

fn default_remote_agent_timeout_secs() -> u64 {
    60
}

fn default_resolve_agent_card() -> bool {
    true
}

impl Default for RemoteAgentSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_remote_agent_timeout_secs(),
            resolve_agent_card: default_resolve_agent_card(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MASTER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MASTER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MASTER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
