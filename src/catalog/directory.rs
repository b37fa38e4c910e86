//! 智能体目录客户端
//!
//! 目录服务（注册、持久化、鉴权）在本仓库之外，这里只消费其只读查询：
//! `GET <url>?agent_type=<filter>&user_id=<id>`，响应 `{"active_connections": [...]}`。
//! user_id 按请求传入（每个用户看到自己的目录），未传时退回配置中的默认值。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::{AgentCatalog, AgentDescriptor, AgentFilter};

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Directory payload could not be decoded: {0}")]
    Decode(String),

    #[error("Catalog file error: {0}")]
    Io(#[from] std::io::Error),
}

/// 目录查询 trait
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn list_agents(
        &self,
        filter: AgentFilter,
        user_id: Option<&str>,
    ) -> Result<Vec<AgentDescriptor>, DirectoryError>;

    /// 取一次快照；对话期间不再重新拉取
    async fn snapshot(
        &self,
        filter: AgentFilter,
        user_id: Option<&str>,
    ) -> Result<AgentCatalog, DirectoryError> {
        Ok(AgentCatalog::new(self.list_agents(filter, user_id).await?))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogPayload {
    Envelope { active_connections: Vec<AgentDescriptor> },
    Bare(Vec<AgentDescriptor>),
}

impl CatalogPayload {
    fn into_agents(self) -> Vec<AgentDescriptor> {
        match self {
            CatalogPayload::Envelope { active_connections } => active_connections,
            CatalogPayload::Bare(agents) => agents,
        }
    }
}

/// HTTP 目录：带 X-API-KEY 请求后端 /agents/active
pub struct HttpAgentDirectory {
    client: Client,
    url: String,
    api_key: Option<String>,
    user_id: Option<String>,
}

impl HttpAgentDirectory {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        user_id: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            api_key,
            user_id,
        }
    }
}

#[async_trait]
impl AgentDirectory for HttpAgentDirectory {
    async fn list_agents(
        &self,
        filter: AgentFilter,
        user_id: Option<&str>,
    ) -> Result<Vec<AgentDescriptor>, DirectoryError> {
        let mut query = vec![("agent_type", filter.as_query().to_string())];
        if let Some(user_id) = user_id.or(self.user_id.as_deref()) {
            query.push(("user_id", user_id.to_string()));
        }
        let mut request = self.client.get(&self.url).query(&query);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let payload: CatalogPayload = response
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;
        let agents = payload.into_agents();
        tracing::info!(
            count = agents.len(),
            filter = filter.as_query(),
            user_id = user_id.unwrap_or("-"),
            "catalog fetched"
        );
        Ok(agents)
    }
}

/// 静态目录：内存列表或本地 JSON 文件（测试、离线演示）
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    agents: Vec<AgentDescriptor>,
}

impl StaticDirectory {
    pub fn new(agents: Vec<AgentDescriptor>) -> Self {
        Self { agents }
    }

    /// 读取 `{"active_connections": [...]}` 或裸数组
    pub fn from_file(path: &Path) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, DirectoryError> {
        let payload: CatalogPayload =
            serde_json::from_str(raw).map_err(|e| DirectoryError::Decode(e.to_string()))?;
        Ok(Self::new(payload.into_agents()))
    }
}

#[async_trait]
impl AgentDirectory for StaticDirectory {
    async fn list_agents(
        &self,
        filter: AgentFilter,
        _user_id: Option<&str>,
    ) -> Result<Vec<AgentDescriptor>, DirectoryError> {
        Ok(self
            .agents
            .iter()
            .filter(|a| filter.matches(a.kind))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AgentKind;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    const CATALOG: &str = r#"{
        "active_connections": [
            {"id": "1", "name": "summarizer_a1b2c3", "type": "genai", "agent_schema": {}, "is_active": true},
            {"id": "2", "name": "translate_qwerty", "type": "mcp", "url": "http://mcp:8000", "is_active": true},
            {"id": "3", "name": "pipeline_zxcvbn", "type": "flow", "flow": ["1", "2"], "is_active": true}
        ]
    }"#;

    #[tokio::test]
    async fn test_static_directory_filters_locally() {
        let dir = StaticDirectory::from_json(CATALOG).unwrap();
        let all = dir.list_agents(AgentFilter::All, None).await.unwrap();
        assert_eq!(all.len(), 3);
        let mcp = dir.list_agents(AgentFilter::ToolServer, None).await.unwrap();
        assert_eq!(mcp.len(), 1);
        assert_eq!(mcp[0].kind, AgentKind::ToolServer);
    }

    #[tokio::test]
    async fn test_static_directory_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[{\"id\": \"7\", \"name\": \"echo_aaaaaa\", \"type\": \"genai\"}]")
            .unwrap();
        let dir = StaticDirectory::from_file(file.path()).unwrap();
        let catalog = dir.snapshot(AgentFilter::All, None).await.unwrap();
        assert!(catalog.find("echo_aaaaaa").is_some());
    }

    /// 本地目录服务：记录每次请求的查询参数与 X-API-KEY
    async fn spawn_directory() -> (String, Arc<Mutex<Vec<(HashMap<String, String>, Option<String>)>>>) {
        use axum::extract::{Query, State};
        use axum::http::HeaderMap;
        use axum::routing::get;

        type Seen = Arc<Mutex<Vec<(HashMap<String, String>, Option<String>)>>>;
        async fn active(
            State(seen): State<Seen>,
            headers: HeaderMap,
            Query(query): Query<HashMap<String, String>>,
        ) -> String {
            let key = headers
                .get("X-API-KEY")
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            seen.lock().unwrap().push((query, key));
            CATALOG.to_string()
        }

        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let app = axum::Router::new()
            .route("/agents/active", get(active))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (format!("http://{}/agents/active", addr), seen)
    }

    #[tokio::test]
    async fn test_http_directory_uses_request_user() {
        let (url, seen) = spawn_directory().await;
        let dir = HttpAgentDirectory::new(url, Some("be-key".into()), Some("fallback".into()), 5);

        let catalog = dir.snapshot(AgentFilter::All, Some("user-42")).await.unwrap();
        assert_eq!(catalog.len(), 3);
        dir.list_agents(AgentFilter::ToolServer, None).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0].0.get("user_id").map(String::as_str), Some("user-42"));
        assert_eq!(seen[0].0.get("agent_type").map(String::as_str), Some("all"));
        assert_eq!(seen[0].1.as_deref(), Some("be-key"));
        assert_eq!(seen[1].0.get("user_id").map(String::as_str), Some("fallback"));
        assert_eq!(seen[1].0.get("agent_type").map(String::as_str), Some("mcp"));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let err = StaticDirectory::from_json("{not json").unwrap_err();
        assert!(matches!(err, DirectoryError::Decode(_)));
    }
}
