//! Master Agent - 多协议智能体编排引擎
//!
//! 模块划分：
//! - **agent**: 无头主控运行时（目录快照 + 主控循环 + 回复封装）
//! - **catalog**: 智能体描述符、目录快照、别名、目录查询客户端
//! - **channel**: 原生智能体通道（路由器 WebSocket）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **connectors**: 协议连接器（原生 / MCP 工具服务器 / A2A 远程智能体 / flow）
//! - **conversation**: 对话消息与调用提议
//! - **core**: 主控循环、对话状态、上下文、事件、派发策略
//! - **dispatch**: 调用配置与动作解析
//! - **oracle**: 决策步骤抽象与实现（OpenAI 兼容 / 重试 / 脚本化）
//! - **serve**: 在路由器上注册并处理转发来的对话请求
//! - **trace**: 调用轨迹（flow 嵌套）

pub mod agent;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod connectors;
pub mod conversation;
pub mod core;
pub mod dispatch;
pub mod observability;
pub mod oracle;
pub mod serve;
pub mod trace;

pub use agent::{AgentReply, ChatRequest, MasterAgent};
pub use core::{Orchestrator, OrchestratorError};
