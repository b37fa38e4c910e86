//! WebSocket 原生通道
//!
//! 一条持久连接 + 写任务 + 读任务；并发请求按 request_id 复用同一连接，
//! 等待方持有 oneshot，读任务收到响应后按 id 投递。连接关闭时所有等待方立即得到 Closed。
//!
//! 同一连接也可以反向服务：`serve` 向路由器注册本智能体，之后路由器转发来的请求
//! （带 `message`、不带 `is_success` 的帧）进入返回的接收端，处理完用 `reply` 按 request_id 回复。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::channel::{ChannelError, NativeChannel, NativeResponse};

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<NativeResponse>>>>;
type Inbound = Arc<Mutex<Option<mpsc::UnboundedSender<InboundRequest>>>>;

#[derive(Serialize)]
struct RequestFrame<'a> {
    request_id: &'a str,
    client_id: &'a str,
    message: &'a Value,
}

#[derive(Serialize, Deserialize)]
struct ResponseFrame {
    request_id: String,
    #[serde(flatten)]
    response: NativeResponse,
}

/// 路由器转发给本智能体的一次请求
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundRequest {
    pub request_id: String,
    pub message: Value,
}

/// 带 message 且不带 is_success 的帧是发给本智能体的请求，其余按响应处理
fn is_inbound(frame: &Value) -> bool {
    frame.get("message").is_some() && frame.get("is_success").is_none()
}

/// 连接断开：标记关闭并丢弃所有 sender，等待方立即收到 RecvError
async fn fail_pending(pending: &Pending, closed: &AtomicBool) {
    closed.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
}

/// 路由器 WebSocket 通道，可在多个对话间共享（Arc）
pub struct WsChannel {
    outbound: mpsc::UnboundedSender<String>,
    pending: Pending,
    inbound: Inbound,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl WsChannel {
    /// 建立连接；api_key 通过 X-API-KEY 头传递
    pub async fn connect(
        url: &str,
        api_key: Option<&str>,
        request_timeout_secs: u64,
    ) -> Result<Self, ChannelError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        if let Some(key) = api_key {
            let value =
                HeaderValue::from_str(key).map_err(|e| ChannelError::Connect(e.to_string()))?;
            request.headers_mut().insert("X-API-KEY", value);
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        tracing::info!(url = %url, "native channel connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let inbound: Inbound = Arc::new(Mutex::new(None));
        let closed = Arc::new(AtomicBool::new(false));

        let writer_pending = pending.clone();
        let writer_closed = closed.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = ws_tx.send(WsMessage::Text(frame)).await {
                    tracing::warn!("native channel send error: {}", e);
                    break;
                }
            }
            fail_pending(&writer_pending, &writer_closed).await;
            let _ = ws_tx.close().await;
        });

        let reader_pending = pending.clone();
        let reader_inbound = inbound.clone();
        let reader_closed = closed.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                let text = match msg {
                    Ok(WsMessage::Text(t)) => t,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!("native channel receive error: {}", e);
                        break;
                    }
                };
                let raw: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::debug!("ignoring unparsable channel frame: {}", e);
                        continue;
                    }
                };

                if is_inbound(&raw) {
                    match serde_json::from_value::<InboundRequest>(raw) {
                        Ok(request) => match reader_inbound.lock().await.as_ref() {
                            Some(tx) => {
                                let _ = tx.send(request);
                            }
                            None => {
                                tracing::debug!(request_id = %request.request_id, "not serving, inbound request dropped");
                            }
                        },
                        Err(e) => tracing::debug!("ignoring malformed inbound request: {}", e),
                    }
                    continue;
                }

                let frame: ResponseFrame = match serde_json::from_value(raw) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::debug!("ignoring unrecognised channel frame: {}", e);
                        continue;
                    }
                };
                let waiter = reader_pending.lock().await.remove(&frame.request_id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(frame.response);
                    }
                    None => {
                        tracing::debug!(request_id = %frame.request_id, "late or unknown channel response");
                    }
                }
            }
            fail_pending(&reader_pending, &reader_closed).await;
            // 结束 serve 循环
            reader_inbound.lock().await.take();
            tracing::info!("native channel closed");
        });

        Ok(Self {
            outbound,
            pending,
            inbound,
            closed,
            request_timeout: Duration::from_secs(request_timeout_secs),
            tasks: vec![writer, reader],
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 正在等待响应的请求数
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// 以 name 向路由器注册，返回转发来的请求；连接关闭时接收端结束
    pub async fn serve(
        &self,
        name: &str,
        description: &str,
    ) -> Result<mpsc::UnboundedReceiver<InboundRequest>, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound.lock().await = Some(tx);

        let frame = json!({"type": "register", "name": name, "description": description});
        self.outbound
            .send(frame.to_string())
            .map_err(|_| ChannelError::Closed)?;
        tracing::info!(agent = %name, "registered on router");
        Ok(rx)
    }

    /// 回复一次转发来的请求
    pub fn reply(&self, request_id: &str, response: NativeResponse) -> Result<(), ChannelError> {
        let frame = serde_json::to_string(&ResponseFrame {
            request_id: request_id.to_string(),
            response,
        })
        .map_err(|e| ChannelError::Encode(e.to_string()))?;
        self.outbound.send(frame).map_err(|_| ChannelError::Closed)
    }
}

#[async_trait]
impl NativeChannel for WsChannel {
    async fn send(&self, target_id: &str, message: Value) -> Result<NativeResponse, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&RequestFrame {
            request_id: &request_id,
            client_id: target_id,
            message: &message,
        })
        .map_err(|e| ChannelError::Encode(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        // 读写任务可能在插入前已退出并清空了等待表
        if self.is_closed() || self.outbound.send(frame).is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(ChannelError::Closed);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(ChannelError::Timeout(target_id.to_string()))
            }
        }
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
