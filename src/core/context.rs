//! 对话级上下文：显式传递目录快照、Oracle、原生通道与取消令牌，不使用全局单例

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::catalog::AgentCatalog;
use crate::channel::NativeChannel;
use crate::core::OrchestratorEvent;
use crate::oracle::Oracle;

#[derive(Clone)]
pub struct ConversationContext {
    /// 循环开始时的目录快照，对话期间不变
    pub catalog: AgentCatalog,
    pub oracle: Arc<dyn Oracle>,
    /// 共享的原生通道（多对话复用，按 request_id 复用连接）
    pub channel: Arc<dyn NativeChannel>,
    /// flow 嵌套层级，顶层为 0
    pub depth: usize,
    pub cancel: CancellationToken,
    pub events: Option<mpsc::UnboundedSender<OrchestratorEvent>>,
}

impl ConversationContext {
    pub fn new(
        catalog: AgentCatalog,
        oracle: Arc<dyn Oracle>,
        channel: Arc<dyn NativeChannel>,
    ) -> Self {
        Self {
            catalog,
            oracle,
            channel,
            depth: 0,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn emit(&self, event: OrchestratorEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
