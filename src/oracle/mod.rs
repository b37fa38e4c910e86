//! Oracle：决策步骤抽象
//!
//! 给定当前对话与绑定的工具定义，返回一条 assistant 消息：calls 非空表示提议调用，
//! 为空表示终止（content 即最终回复）。实现：OpenAI 兼容 HTTP / 重试包装 / 脚本化（测试）。

pub mod openai;
pub mod retry;
pub mod scripted;

use async_openai::error::OpenAIError;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::conversation::Message;

pub use openai::OpenAiOracle;
pub use retry::{RetryConfig, RetryingOracle};
pub use scripted::{OracleObservation, ScriptStep, ScriptedOracle};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    Http(String),

    #[error("Oracle API error: {message}")]
    Api {
        /// 服务端错误类型，如 invalid_request_error / rate_limit_exceeded
        kind: Option<String>,
        message: String,
    },

    #[error("Oracle response malformed: {0}")]
    Malformed(String),

    #[error("Oracle timed out")]
    Timeout,
}

impl OracleError {
    /// 网络层、超时与限流可重试；格式错误与其它 API 错误重试无意义
    pub fn is_retryable(&self) -> bool {
        match self {
            OracleError::Http(_) | OracleError::Timeout => true,
            OracleError::Api { kind, .. } => kind.as_deref() == Some("rate_limit_exceeded"),
            OracleError::Malformed(_) => false,
        }
    }
}

impl From<OpenAIError> for OracleError {
    fn from(e: OpenAIError) -> Self {
        match e {
            OpenAIError::ApiError(api) => OracleError::Api {
                kind: api.r#type,
                message: api.message,
            },
            OpenAIError::JSONDeserialize(..) | OpenAIError::InvalidArgument(_) => {
                OracleError::Malformed(e.to_string())
            }
            other => OracleError::Http(other.to_string()),
        }
    }
}

/// 决策 trait
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn decide(&self, messages: &[Message], tools: &[Value]) -> Result<Message, OracleError>;
}
