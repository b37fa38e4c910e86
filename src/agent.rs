//! Headless 主控智能体运行时
//!
//! 供路由器、HTTP 等前端调用：每轮对话拉取一次目录快照，拼上系统提示词，运行主控循环，
//! 返回 `{response, agents_trace, is_success}`。任何错误都转成 is_success=false 的回复，不向外抛出。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::catalog::{AgentDirectory, AgentFilter, DirectoryError, HttpAgentDirectory, StaticDirectory};
use crate::channel::{DisconnectedChannel, NativeChannel, WsChannel};
use crate::config::AppConfig;
use crate::conversation::{Message, Role};
use crate::core::{
    ConversationContext, LoopOutcome, Orchestrator, OrchestratorError, OrchestratorEvent,
};
use crate::oracle::{OpenAiOracle, Oracle, RetryConfig, RetryingOracle};
use crate::trace::TraceRecord;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a master agent. Decide which of the available agents should handle \
the user's request, call them one at a time, and answer the user once you have enough information.";

/// 一轮对话中断的原因（对外统一转成失败回复）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

/// 一轮对话请求
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// 发起请求的用户；目录按用户返回可用智能体
    pub user_id: Option<String>,
    /// 覆盖默认系统提示词（基础提示词）
    pub system_prompt: Option<String>,
    /// 用户自定义提示词，优先于基础提示词
    pub user_prompt: Option<String>,
    /// 历史消息，最后一条通常是用户消息
    pub history: Vec<Message>,
    pub cancel: Option<CancellationToken>,
}

impl ChatRequest {
    pub fn new(history: Vec<Message>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn from_user(text: impl Into<String>) -> Self {
        Self::new(vec![Message::user(text.into())])
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_user_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.user_prompt = Some(prompt.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// 生效的系统提示词：用户提示词 > 基础提示词 > fallback
    fn resolved_prompt(&self, fallback: &str) -> String {
        self.user_prompt
            .as_deref()
            .or(self.system_prompt.as_deref())
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// 路由器转发来的对话请求（serve 模式）
///
/// ```json
/// {"session_id": "s1", "user_id": "u1", "message": "hi",
///  "history": [...], "configs": {"llm": {"system_prompt": "...", "user_prompt": "..."}}}
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouterRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// 本轮用户消息；也可以只给 history
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub configs: RequestConfigs,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestConfigs {
    #[serde(default)]
    pub llm: PromptConfigs,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptConfigs {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
}

impl RouterRequest {
    pub fn into_chat_request(self) -> ChatRequest {
        let mut history = self.history;
        if let Some(text) = self.message {
            history.push(Message::user(text));
        }
        ChatRequest {
            user_id: self.user_id,
            system_prompt: self.configs.llm.system_prompt,
            user_prompt: self.configs.llm.user_prompt,
            history,
            cancel: None,
        }
    }
}

/// 返回给调用方的结果
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub agents_trace: Vec<TraceRecord>,
    pub response: String,
    pub is_success: bool,
}

impl AgentReply {
    fn from_outcome(outcome: LoopOutcome) -> Self {
        Self {
            is_success: outcome.termination.is_completed(),
            agents_trace: outcome.trace,
            response: outcome.response,
        }
    }

    /// 请求体无法解析时的回复
    pub fn invalid_request(error: impl std::fmt::Display) -> Self {
        Self {
            agents_trace: Vec::new(),
            response: format!("Invalid request: {}", error),
            is_success: false,
        }
    }

    /// 失败回复：带上中断前已完成的轨迹
    fn failure(error: impl std::fmt::Display, agents_trace: Vec<TraceRecord>) -> Self {
        Self {
            agents_trace,
            response: format!("An error occurred: {}", error),
            is_success: false,
        }
    }
}

/// 主控智能体：Oracle、原生通道、目录均可在多个对话间共享
pub struct MasterAgent {
    orchestrator: Orchestrator,
    oracle: Arc<dyn Oracle>,
    channel: Arc<dyn NativeChannel>,
    directory: Arc<dyn AgentDirectory>,
    filter: AgentFilter,
    system_prompt: String,
    events: Option<mpsc::UnboundedSender<OrchestratorEvent>>,
}

impl MasterAgent {
    pub fn new(
        orchestrator: Orchestrator,
        oracle: Arc<dyn Oracle>,
        channel: Arc<dyn NativeChannel>,
        directory: Arc<dyn AgentDirectory>,
    ) -> Self {
        Self {
            orchestrator,
            oracle,
            channel,
            directory,
            filter: AgentFilter::All,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            events: None,
        }
    }

    /// 按配置构建：OpenAI 兼容 Oracle（可选重试）、路由器通道（连不上时退化为断开通道）、HTTP 或本地目录
    pub async fn from_config(cfg: &AppConfig) -> Result<Self, DirectoryError> {
        let channel: Arc<dyn NativeChannel> = match &cfg.channel.ws_url {
            Some(url) => match WsChannel::connect(
                url,
                cfg.channel.api_key.as_deref(),
                cfg.channel.request_timeout_secs,
            )
            .await
            {
                Ok(ch) => Arc::new(ch),
                Err(e) => {
                    tracing::warn!("Router connection failed ({}), native agents unavailable", e);
                    Arc::new(DisconnectedChannel)
                }
            },
            None => {
                tracing::warn!("No router url configured, native agents unavailable");
                Arc::new(DisconnectedChannel)
            }
        };
        Self::from_config_with_channel(cfg, channel)
    }

    /// 使用已建立的原生通道构建（serve 模式下与接收请求共用同一连接）
    pub fn from_config_with_channel(
        cfg: &AppConfig,
        channel: Arc<dyn NativeChannel>,
    ) -> Result<Self, DirectoryError> {
        let base: Arc<dyn Oracle> = Arc::new(OpenAiOracle::new(
            &cfg.oracle.base_url,
            &cfg.oracle.model,
            cfg.oracle.resolved_api_key(),
            cfg.oracle.timeout_secs,
        ));
        let oracle: Arc<dyn Oracle> = if cfg.oracle.max_retries > 0 {
            Arc::new(RetryingOracle::new(
                base,
                RetryConfig {
                    max_retries: cfg.oracle.max_retries,
                    initial_backoff_ms: cfg.oracle.initial_backoff_ms,
                },
            ))
        } else {
            base
        };

        let directory: Arc<dyn AgentDirectory> = if let Some(path) = &cfg.directory.catalog_path {
            Arc::new(StaticDirectory::from_file(path)?)
        } else if let Some(url) = &cfg.directory.url {
            Arc::new(HttpAgentDirectory::new(
                url.clone(),
                cfg.directory.api_key.clone(),
                cfg.directory.user_id.clone(),
                cfg.directory.timeout_secs,
            ))
        } else {
            tracing::warn!("No agent directory configured, catalog is empty");
            Arc::new(StaticDirectory::default())
        };

        let mut agent = Self::new(Orchestrator::from_config(cfg), oracle, channel, directory)
            .with_filter(cfg.directory.filter);
        if let Some(prompt) = &cfg.oracle.system_prompt {
            agent = agent.with_system_prompt(prompt.clone());
        }
        Ok(agent)
    }

    pub fn with_filter(mut self, filter: AgentFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// 运行一轮对话；目录或 Oracle 失败、取消都转成失败回复
    pub async fn respond(&self, request: ChatRequest) -> AgentReply {
        match self.run(request).await {
            Ok(outcome) => {
                tracing::info!(
                    dispatches = outcome.trace.len(),
                    termination = ?outcome.termination,
                    "master agent finished"
                );
                AgentReply::from_outcome(outcome)
            }
            Err(e) => {
                tracing::error!("master agent failed: {}", e);
                let trace = match &e {
                    AgentError::Orchestrator(inner) => inner.clone().into_partial_trace(),
                    AgentError::Directory(_) => Vec::new(),
                };
                AgentReply::failure(e, trace)
            }
        }
    }

    async fn run(&self, request: ChatRequest) -> Result<LoopOutcome, AgentError> {
        let catalog = self
            .directory
            .snapshot(self.filter, request.user_id.as_deref())
            .await?;
        tracing::info!(
            agents = catalog.len(),
            user_id = request.user_id.as_deref().unwrap_or("-"),
            "catalog snapshot taken"
        );

        let prompt = request.resolved_prompt(&self.system_prompt);
        let mut messages = vec![Message::system(prompt)];
        messages.extend(request.history.into_iter().filter(|m| m.role != Role::System));

        let mut ctx = ConversationContext::new(catalog, self.oracle.clone(), self.channel.clone());
        if let Some(cancel) = request.cancel {
            ctx = ctx.with_cancel(cancel);
        }
        if let Some(tx) = &self.events {
            ctx = ctx.with_events(tx.clone());
        }
        Ok(self.orchestrator.run_loop(&ctx, messages).await?)
    }
}
