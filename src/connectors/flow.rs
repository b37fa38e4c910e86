//! Flow 连接器：在成员子目录上递归运行同一个编排循环
//!
//! 子循环的全部轨迹作为一条嵌套记录挂在父轨迹上；超过最大嵌套深度时不再递归，直接生成失败记录。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::catalog::AgentKind;
use crate::connectors::{Connector, Invocation};
use crate::conversation::{Message, Role};
use crate::core::{ConversationContext, ConversationLoop};
use crate::dispatch::FlowConfig;
use crate::trace::TraceRecord;

pub struct FlowConnector {
    runner: Arc<dyn ConversationLoop>,
    max_depth: usize,
}

impl FlowConnector {
    pub fn new(runner: Arc<dyn ConversationLoop>, max_depth: usize) -> Self {
        Self { runner, max_depth }
    }
}

fn last_user_text(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(Message::text)
        .unwrap_or_default()
}

#[async_trait]
impl Connector for FlowConnector {
    type Config = FlowConfig;

    async fn invoke(&self, config: FlowConfig) -> Invocation {
        let started = Instant::now();
        let trace = TraceRecord::new(
            config.id.clone(),
            config.name.clone(),
            AgentKind::Flow,
            Value::String(last_user_text(&config.messages)),
        );

        if config.depth > self.max_depth {
            let message = format!(
                "Flow '{}' exceeds the maximum nesting depth of {}",
                config.name, self.max_depth
            );
            tracing::warn!(flow = %config.name, depth = config.depth, "{}", message);
            return Invocation::failed(trace, message, started);
        }

        let ctx = ConversationContext {
            catalog: config.members,
            oracle: config.oracle,
            channel: config.channel,
            depth: config.depth,
            cancel: config.cancel,
            events: config.events,
        };

        match self.runner.run(ctx, config.messages).await {
            Ok(outcome) => {
                tracing::debug!(
                    flow = %config.name,
                    dispatches = outcome.trace.len(),
                    "flow finished"
                );
                Invocation {
                    payload: outcome.response,
                    trace: trace.nest(outcome.trace, started),
                }
            }
            Err(e) => {
                let message = format!("Unexpected error while running flow: {}", e);
                tracing::warn!(flow = %config.name, "{}", message);
                let partial = e.into_partial_trace();
                if partial.is_empty() {
                    return Invocation::failed(trace, message, started);
                }
                Invocation {
                    payload: message,
                    trace: trace.nest_failed(partial, started),
                }
            }
        }
    }
}
