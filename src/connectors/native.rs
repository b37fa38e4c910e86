//! 原生通道连接器：经共享的路由器通道按 id 发送，等待一条关联响应

use std::time::Instant;

use async_trait::async_trait;

use crate::catalog::AgentKind;
use crate::connectors::{payload_text, Connector, Invocation};
use crate::dispatch::NativeConfig;
use crate::trace::TraceRecord;

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeConnector;

#[async_trait]
impl Connector for NativeConnector {
    type Config = NativeConfig;

    async fn invoke(&self, config: NativeConfig) -> Invocation {
        let started = Instant::now();
        let trace = TraceRecord::new(
            config.id.clone(),
            config.name.clone(),
            AgentKind::Native,
            config.arguments.clone(),
        );

        match config.channel.send(&config.id, config.arguments).await {
            Ok(response) => {
                let payload = payload_text(&response.payload);
                let trace = trace
                    .with_execution_time(response.elapsed_time)
                    .complete(response.success, response.payload, started);
                Invocation { payload, trace }
            }
            Err(e) => {
                let message = format!("Unexpected error while invoking GenAI agent: {}", e);
                tracing::warn!(agent = %config.name, "{}", message);
                Invocation::failed(trace, message, started)
            }
        }
    }
}
