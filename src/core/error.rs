//! 编排错误
//!
//! - Configuration：动作名无法解析或描述符类型不支持；终止本轮对话，不重试
//! - Oracle：决策步骤失败；默认致命（可由 RetryingOracle 先行重试），携带失败前已完成的轨迹
//! - Cancelled：调用方取消；不为被取消的调用生成轨迹
//!
//! 适配器内部的传输错误（TransportError）在适配器内就地转为失败轨迹，不会出现在这里。

use thiserror::Error;

use crate::oracle::OracleError;
use crate::trace::TraceRecord;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Oracle error: {source}")]
    Oracle {
        source: OracleError,
        /// Oracle 失败前本轮已完成的派发记录
        partial: Vec<TraceRecord>,
    },

    #[error("Cancelled")]
    Cancelled,
}

impl OrchestratorError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        OrchestratorError::Configuration(msg.into())
    }

    pub fn oracle(source: OracleError, partial: Vec<TraceRecord>) -> Self {
        OrchestratorError::Oracle { source, partial }
    }

    /// 中断前已写入的轨迹；只有 Oracle 失败会携带
    pub fn into_partial_trace(self) -> Vec<TraceRecord> {
        match self {
            OrchestratorError::Oracle { partial, .. } => partial,
            _ => Vec::new(),
        }
    }
}

impl From<OracleError> for OrchestratorError {
    fn from(source: OracleError) -> Self {
        OrchestratorError::oracle(source, Vec::new())
    }
}
