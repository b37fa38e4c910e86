//! serve 模式：在路由器上注册主控智能体，逐条处理转发来的对话请求
//!
//! 每个请求独立起一个任务；请求体按 RouterRequest 解析（user_id 决定目录，configs.llm 决定提示词），
//! 结果 `{response, agents_trace, is_success}` 作为响应体回给路由器。

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::agent::{AgentReply, MasterAgent, RouterRequest};
use crate::channel::{ChannelError, InboundRequest, NativeResponse, WsChannel};

/// 处理一次转发来的请求
pub async fn handle_request(
    agent: &MasterAgent,
    message: serde_json::Value,
    cancel: CancellationToken,
) -> AgentReply {
    match serde_json::from_value::<RouterRequest>(message) {
        Ok(request) => {
            tracing::info!(
                session_id = request.session_id.as_deref().unwrap_or("-"),
                user_id = request.user_id.as_deref().unwrap_or("-"),
                "router request received"
            );
            agent
                .respond(request.into_chat_request().with_cancel(cancel))
                .await
        }
        Err(e) => {
            tracing::warn!("malformed router request: {}", e);
            AgentReply::invalid_request(e)
        }
    }
}

/// 注册并处理请求，直到连接关闭或 shutdown 被取消
pub async fn serve(
    agent: Arc<MasterAgent>,
    channel: Arc<WsChannel>,
    name: &str,
    description: &str,
    shutdown: CancellationToken,
) -> Result<(), ChannelError> {
    let mut requests = channel.serve(name, description).await?;

    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("serve loop shutting down");
                break;
            }
            next = requests.recv() => match next {
                Some(request) => request,
                None => {
                    tracing::warn!("router connection closed");
                    break;
                }
            },
        };

        let agent = Arc::clone(&agent);
        let channel = Arc::clone(&channel);
        let cancel = shutdown.child_token();
        tokio::spawn(async move {
            let InboundRequest { request_id, message } = request;
            let started = Instant::now();
            let reply = handle_request(&agent, message, cancel).await;
            let response = NativeResponse {
                success: reply.is_success,
                payload: serde_json::to_value(&reply).unwrap_or_default(),
                elapsed_time: Some(started.elapsed().as_secs_f64()),
            };
            if let Err(e) = channel.reply(&request_id, response) {
                tracing::error!(request_id = %request_id, "failed to reply: {}", e);
            }
        });
    }
    Ok(())
}
