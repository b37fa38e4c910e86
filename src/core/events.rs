//! 编排过程事件：供 Web / SSE 等前端流式展示
//!
//! 发送端可选；发送失败（接收端已丢弃）直接忽略，不影响循环。

use serde::Serialize;
use serde_json::Value;

use crate::catalog::AgentKind;
use crate::core::Termination;

/// 单步过程事件，depth 为 flow 嵌套层级（顶层为 0）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// 进入新一轮 SELECT
    Step {
        depth: usize,
        step: usize,
        max_steps: usize,
    },
    /// 正在询问 Oracle
    Thinking { depth: usize },
    /// 派发调用
    AgentCall {
        depth: usize,
        agent: String,
        kind: AgentKind,
        arguments: Value,
    },
    /// 调用返回（预览，避免过长）
    AgentResult {
        depth: usize,
        agent: String,
        success: bool,
        preview: String,
    },
    /// 同一轮中被派发策略丢弃的提议
    Discarded { depth: usize, agents: Vec<String> },
    /// 循环结束
    Finished {
        depth: usize,
        termination: Termination,
    },
    Error { depth: usize, text: String },
}
