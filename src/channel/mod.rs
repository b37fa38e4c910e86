//! 原生智能体通道
//!
//! 原生（genai）智能体挂在路由器上，通过一条持久双工连接按 target id 寻址：
//! 请求带 request_id，响应按 request_id 关联回等待方；超时由通道自己负责。

pub mod ws;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use ws::{InboundRequest, WsChannel};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("Channel connect failed: {0}")]
    Connect(String),

    #[error("Channel closed")]
    Closed,

    #[error("Channel request to {0} timed out")]
    Timeout(String),

    #[error("Channel frame encode failed: {0}")]
    Encode(String),
}

/// 原生智能体的一次响应
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NativeResponse {
    #[serde(rename = "is_success", default)]
    pub success: bool,
    #[serde(rename = "response", default)]
    pub payload: Value,
    /// 远端执行时间（秒）
    #[serde(rename = "execution_time", default)]
    pub elapsed_time: Option<f64>,
}

/// 原生通道 trait：按 target id 发送一次请求并等待关联响应
#[async_trait]
pub trait NativeChannel: Send + Sync {
    async fn send(&self, target_id: &str, message: Value) -> Result<NativeResponse, ChannelError>;
}

/// 未配置路由器时使用：所有请求立即失败，原生智能体按失败轨迹处理而不会中断对话
#[derive(Debug, Default, Clone, Copy)]
pub struct DisconnectedChannel;

#[async_trait]
impl NativeChannel for DisconnectedChannel {
    async fn send(&self, _target_id: &str, _message: Value) -> Result<NativeResponse, ChannelError> {
        Err(ChannelError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_wire_names() {
        let r: NativeResponse = serde_json::from_value(json!({
            "request_id": "r1",
            "is_success": true,
            "response": {"summary": "ok"},
            "execution_time": 0.42
        }))
        .unwrap();
        assert!(r.success);
        assert_eq!(r.payload["summary"], "ok");
        assert_eq!(r.elapsed_time, Some(0.42));
    }

    #[tokio::test]
    async fn test_disconnected_channel_fails() {
        let err = DisconnectedChannel.send("agent", json!({})).await.unwrap_err();
        assert_eq!(err, ChannelError::Closed);
    }
}
