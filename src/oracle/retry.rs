//! Oracle 重试包装：指数退避，耗尽后返回最后一次错误（不吞错）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::conversation::Message;
use crate::oracle::{Oracle, OracleError};

/// 单次退避上限
const MAX_BACKOFF_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// 0 表示首次失败即返回
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 500,
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待（从 0 计），每次翻倍
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
    }
}

pub struct RetryingOracle {
    inner: Arc<dyn Oracle>,
    config: RetryConfig,
}

impl RetryingOracle {
    pub fn new(inner: Arc<dyn Oracle>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Oracle for RetryingOracle {
    async fn decide(&self, messages: &[Message], tools: &[Value]) -> Result<Message, OracleError> {
        let mut attempt = 0;
        loop {
            match self.inner.decide(messages, tools).await {
                Ok(m) => return Ok(m),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let wait = self.config.backoff(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "oracle failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
