//! Resolver：动作名 -> 描述符 -> 调用配置
//!
//! 只在对话开始时的目录快照中按名精确查找；找不到或类型不支持均为 Configuration 错误。

use serde_json::Value;

use crate::catalog::{strip_alias_suffix, AgentCatalog, AgentDescriptor, AgentKind};
use crate::conversation::{Message, Role, ToolCall};
use crate::core::{ConversationContext, OrchestratorError};
use crate::dispatch::{
    A2aMessage, FlowConfig, InvocationConfig, NativeConfig, RemoteAgentConfig, ToolServerConfig,
};

pub struct Resolver<'a> {
    catalog: &'a AgentCatalog,
    endpoint_suffix: &'a str,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a AgentCatalog, endpoint_suffix: &'a str) -> Self {
        Self {
            catalog,
            endpoint_suffix,
        }
    }

    pub fn resolve(&self, name: &str) -> Result<&'a AgentDescriptor, OrchestratorError> {
        self.catalog.find(name).ok_or_else(|| {
            OrchestratorError::configuration(format!("unknown agent '{}' proposed", name))
        })
    }

    /// 为一个提议构建调用配置；history 为当前对话（末尾是触发本次调用的 assistant 消息）
    pub fn build(
        &self,
        call: &ToolCall,
        ctx: &ConversationContext,
        history: &[Message],
    ) -> Result<InvocationConfig, OrchestratorError> {
        let descriptor = self.resolve(&call.name)?;
        let logical_name = strip_alias_suffix(&descriptor.name).to_string();

        let config = match descriptor.kind {
            AgentKind::Native => InvocationConfig::Native(NativeConfig {
                id: descriptor.id.clone(),
                name: logical_name,
                arguments: call.arguments.clone(),
                channel: ctx.channel.clone(),
            }),
            AgentKind::ToolServer => {
                let base = require_url(descriptor)?;
                InvocationConfig::ToolServer(ToolServerConfig {
                    id: descriptor.id.clone(),
                    name: logical_name,
                    endpoint: format!("{}{}", base.trim_end_matches('/'), self.endpoint_suffix),
                    arguments: call.arguments.clone(),
                })
            }
            AgentKind::RemoteAgent => InvocationConfig::RemoteAgent(RemoteAgentConfig {
                id: descriptor.id.clone(),
                name: logical_name,
                endpoint: require_url(descriptor)?.to_string(),
                message: A2aMessage::user_text(instruction_from(&call.arguments)),
            }),
            AgentKind::Flow => InvocationConfig::Flow(FlowConfig {
                id: descriptor.id.clone(),
                name: logical_name,
                members: self.catalog.restrict_to(descriptor.members()),
                oracle: ctx.oracle.clone(),
                channel: ctx.channel.clone(),
                messages: without_last_assistant(history),
                depth: ctx.depth + 1,
                cancel: ctx.cancel.child_token(),
                events: ctx.events.clone(),
            }),
            AgentKind::Unsupported => {
                return Err(OrchestratorError::configuration(format!(
                    "agent '{}' has an unsupported type",
                    descriptor.name
                )))
            }
        };
        Ok(config)
    }
}

fn require_url(descriptor: &AgentDescriptor) -> Result<&str, OrchestratorError> {
    descriptor
        .url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            OrchestratorError::configuration(format!(
                "agent '{}' ({}) has no url",
                descriptor.name, descriptor.kind
            ))
        })
}

/// 远程智能体的指令文本：task 与 text 都有时以空行连接，否则取存在的字符串，再否则为参数 JSON
pub fn instruction_from(arguments: &Value) -> String {
    let field = |key: &str| {
        arguments
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    match (field("task"), field("text")) {
        (Some(task), Some(text)) => format!("{}\n\n{}", task, text),
        (Some(only), None) | (None, Some(only)) => only.to_string(),
        (None, None) => match arguments {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

/// 去掉最后一条 assistant 消息（触发 flow 的那条）
fn without_last_assistant(history: &[Message]) -> Vec<Message> {
    let mut messages = history.to_vec();
    if let Some(pos) = messages.iter().rposition(|m| m.role == Role::Assistant) {
        messages.remove(pos);
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DisconnectedChannel;
    use crate::oracle::ScriptedOracle;
    use serde_json::json;
    use std::sync::Arc;

    fn catalog() -> AgentCatalog {
        AgentCatalog::new(vec![
            AgentDescriptor::new("n1", "summarizer_a1b2c3", AgentKind::Native),
            AgentDescriptor::new("t1", "translate_qwerty", AgentKind::ToolServer)
                .with_url("http://tools:8000/"),
            AgentDescriptor::new("r1", "lab_finder_zxcvbn", AgentKind::RemoteAgent)
                .with_url("http://labs:9000"),
            AgentDescriptor::new("f1", "pipeline_poiuyt", AgentKind::Flow)
                .with_members(vec!["r1".into(), "n1".into()]),
            AgentDescriptor::new("x1", "legacy_mnbvcx", AgentKind::Unsupported),
            AgentDescriptor::new("t2", "broken_lkjhgf", AgentKind::ToolServer),
        ])
    }

    fn ctx(catalog: AgentCatalog) -> ConversationContext {
        ConversationContext::new(
            catalog,
            Arc::new(ScriptedOracle::new()),
            Arc::new(DisconnectedChannel),
        )
    }

    #[test]
    fn test_native_config_strips_alias() {
        let cat = catalog();
        let resolver = Resolver::new(&cat, "/mcp");
        let call = ToolCall::new("c1", "summarizer_a1b2c3", json!({"text": "long"}));
        match resolver.build(&call, &ctx(cat.clone()), &[]).unwrap() {
            InvocationConfig::Native(c) => {
                assert_eq!(c.id, "n1");
                assert_eq!(c.name, "summarizer");
                assert_eq!(c.arguments, json!({"text": "long"}));
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_tool_server_endpoint_suffix() {
        let cat = catalog();
        let resolver = Resolver::new(&cat, "/mcp");
        let call = ToolCall::new("c1", "translate_qwerty", json!({"text": "hola"}));
        match resolver.build(&call, &ctx(cat.clone()), &[]).unwrap() {
            InvocationConfig::ToolServer(c) => {
                assert_eq!(c.endpoint, "http://tools:8000/mcp");
                assert_eq!(c.name, "translate");
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_remote_agent_instruction() {
        let cat = catalog();
        let resolver = Resolver::new(&cat, "/mcp");
        let call = ToolCall::new("c1", "lab_finder_zxcvbn", json!({"task": "Find a lab", "text": "near 10001"}));
        match resolver.build(&call, &ctx(cat.clone()), &[]).unwrap() {
            InvocationConfig::RemoteAgent(c) => {
                assert_eq!(c.endpoint, "http://labs:9000");
                assert_eq!(c.message.text(), "Find a lab\n\nnear 10001");
                assert_eq!(c.message.role, "user");
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_flow_config_members_and_history() {
        let cat = catalog();
        let resolver = Resolver::new(&cat, "/mcp");
        let call = ToolCall::new("c1", "pipeline_poiuyt", json!({}));
        let history = vec![
            Message::system("sys"),
            Message::user("do it"),
            Message::assistant_with_calls("", vec![call.clone()]),
        ];
        match resolver.build(&call, &ctx(cat.clone()), &history).unwrap() {
            InvocationConfig::Flow(c) => {
                let ids: Vec<&str> = c.members.iter().map(|a| a.id.as_str()).collect();
                assert_eq!(ids, vec!["r1", "n1"]);
                assert_eq!(c.messages.len(), 2);
                assert_eq!(c.messages[1].role, Role::User);
                assert_eq!(c.depth, 1);
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_unknown_name_is_configuration_error() {
        let cat = catalog();
        let resolver = Resolver::new(&cat, "/mcp");
        let call = ToolCall::new("c1", "summarizer", json!({}));
        let err = resolver.build(&call, &ctx(cat.clone()), &[]).unwrap_err();
        assert!(matches!(err, OrchestratorError::Configuration(_)));
    }

    #[test]
    fn test_unsupported_and_missing_url_are_configuration_errors() {
        let cat = catalog();
        let resolver = Resolver::new(&cat, "/mcp");
        for name in ["legacy_mnbvcx", "broken_lkjhgf"] {
            let call = ToolCall::new("c1", name, json!({}));
            let err = resolver.build(&call, &ctx(cat.clone()), &[]).unwrap_err();
            assert!(matches!(err, OrchestratorError::Configuration(_)), "{}", name);
        }
    }

    #[test]
    fn test_instruction_fallbacks() {
        assert_eq!(instruction_from(&json!({"text": "only text"})), "only text");
        assert_eq!(instruction_from(&json!({"task": "only task"})), "only task");
        assert_eq!(instruction_from(&json!({"query": 1})), r#"{"query":1}"#);
        assert_eq!(instruction_from(&json!("raw")), "raw");
    }
}
