//! 主控循环：SELECT -> DISPATCH -> SELECT ... -> TERMINATED
//!
//! 每轮询问 Oracle；无提议则终止，否则按派发策略取一个提议，解析为调用配置，
//! 交给对应连接器，写回结果消息与轨迹后进入下一轮。
//! flow 连接器回调本循环（ConversationLoop），嵌套深度由 max_flow_depth 限制。

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::connectors::{audit, preview, ConnectorSet, Connector, FlowConnector, Invocation};
use crate::conversation::Message;
use crate::core::{
    ConversationContext, ConversationState, DispatchPolicy, LoopOutcome, LoopPhase,
    OrchestratorError, OrchestratorEvent, Termination, FIRST_CALL_ONLY,
};
use crate::dispatch::{InvocationConfig, Resolver};

/// 结果预览最大字符数
const RESULT_PREVIEW_CHARS: usize = 200;

/// 可递归调用的编排循环
#[async_trait]
pub trait ConversationLoop: Send + Sync {
    async fn run(
        &self,
        ctx: ConversationContext,
        messages: Vec<Message>,
    ) -> Result<LoopOutcome, OrchestratorError>;
}

/// 循环参数
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_iterations: usize,
    pub max_flow_depth: usize,
    pub endpoint_suffix: String,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_flow_depth: 4,
            endpoint_suffix: "/mcp".to_string(),
        }
    }
}

impl LoopSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_iterations: cfg.orchestrator.max_iterations,
            max_flow_depth: cfg.orchestrator.max_flow_depth,
            endpoint_suffix: cfg.connectors.tool_server.endpoint_suffix.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    connectors: ConnectorSet,
    policy: Arc<dyn DispatchPolicy>,
    settings: LoopSettings,
}

impl Orchestrator {
    pub fn new(connectors: ConnectorSet, settings: LoopSettings) -> Self {
        Self {
            connectors,
            policy: Arc::new(FIRST_CALL_ONLY),
            settings,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(
            ConnectorSet::from_config(&cfg.connectors),
            LoopSettings::from_config(cfg),
        )
    }

    pub fn with_policy(mut self, policy: Arc<dyn DispatchPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    /// 运行一轮对话直到终止
    ///
    /// Oracle 失败与取消以 Err 返回（Oracle 失败携带已完成的轨迹）；单个智能体调用失败只写入失败轨迹，循环继续。
    pub async fn run_loop(
        &self,
        ctx: &ConversationContext,
        messages: Vec<Message>,
    ) -> Result<LoopOutcome, OrchestratorError> {
        let tools = ctx.catalog.tool_definitions();
        let resolver = Resolver::new(&ctx.catalog, &self.settings.endpoint_suffix);
        let mut state = ConversationState::new(messages);
        tracing::debug!(
            depth = ctx.depth,
            agents = ctx.catalog.len(),
            policy = self.policy.name(),
            "conversation loop started"
        );

        let termination = loop {
            if ctx.cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            let limit = self.settings.max_iterations;
            if state.dispatch_count() >= limit {
                tracing::warn!(depth = ctx.depth, "iteration limit {} reached", limit);
                state.push_message(Message::assistant(format!(
                    "Stopped after reaching the limit of {} agent calls without a final answer.",
                    limit
                )));
                break Termination::IterationLimit { limit };
            }

            ctx.emit(OrchestratorEvent::Step {
                depth: ctx.depth,
                step: state.dispatch_count() + 1,
                max_steps: limit,
            });
            ctx.emit(OrchestratorEvent::Thinking { depth: ctx.depth });

            let decision = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(OrchestratorError::Cancelled),
                r = ctx.oracle.decide(state.messages(), &tools) => r,
            };
            let mut decision = match decision {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!(depth = ctx.depth, "oracle failed: {}", e);
                    ctx.emit(OrchestratorEvent::Error {
                        depth: ctx.depth,
                        text: e.to_string(),
                    });
                    return Err(OrchestratorError::oracle(e, state.trace().records().to_vec()));
                }
            };

            let Some(call) = self.policy.select(&decision.calls).cloned() else {
                decision.calls.clear();
                state.push_message(decision);
                break Termination::Completed;
            };

            let discarded: Vec<String> = decision
                .calls
                .iter()
                .filter(|c| c.call_id != call.call_id)
                .map(|c| c.name.clone())
                .collect();
            if !discarded.is_empty() {
                tracing::warn!(
                    depth = ctx.depth,
                    selected = %call.name,
                    "discarding {} additional proposed call(s): {:?}",
                    discarded.len(),
                    discarded
                );
                ctx.emit(OrchestratorEvent::Discarded {
                    depth: ctx.depth,
                    agents: discarded,
                });
            }
            decision.calls = vec![call.clone()];
            state.push_message(decision);

            let config = match resolver.build(&call, ctx, state.messages()) {
                Ok(config) => config,
                Err(OrchestratorError::Configuration(detail)) => {
                    tracing::warn!(depth = ctx.depth, agent = %call.name, "{}", detail);
                    ctx.emit(OrchestratorEvent::Error {
                        depth: ctx.depth,
                        text: detail.clone(),
                    });
                    state.push_message(Message::tool(
                        call.call_id.clone(),
                        call.name.clone(),
                        format!("Configuration error: {}", detail),
                    ));
                    state.push_message(Message::assistant(format!(
                        "Unable to call '{}': {}",
                        call.name, detail
                    )));
                    break Termination::Configuration { detail };
                }
                Err(e) => return Err(e),
            };

            state.enter(LoopPhase::Dispatch);
            ctx.emit(OrchestratorEvent::AgentCall {
                depth: ctx.depth,
                agent: config.name().to_string(),
                kind: config.kind(),
                arguments: call.arguments.clone(),
            });

            let invocation = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(OrchestratorError::Cancelled),
                inv = self.dispatch(config) => inv,
            };
            audit(&invocation.trace);
            ctx.emit(OrchestratorEvent::AgentResult {
                depth: ctx.depth,
                agent: invocation.trace.name.clone(),
                success: invocation.trace.success,
                preview: preview(&invocation.payload, RESULT_PREVIEW_CHARS),
            });

            state.push_message(Message::tool(call.call_id, call.name, invocation.payload));
            state.record(invocation.trace);
            state.enter(LoopPhase::Select);
        };

        state.enter(LoopPhase::Terminated);
        tracing::debug!(
            depth = ctx.depth,
            dispatches = state.dispatch_count(),
            "conversation loop terminated: {:?}",
            termination
        );
        ctx.emit(OrchestratorEvent::Finished {
            depth: ctx.depth,
            termination: termination.clone(),
        });
        Ok(state.into_outcome(termination))
    }

    /// 按配置变体分派到对应连接器
    async fn dispatch(&self, config: InvocationConfig) -> Invocation {
        match config {
            InvocationConfig::Native(c) => self.connectors.native.invoke(c).await,
            InvocationConfig::ToolServer(c) => self.connectors.tool_server.invoke(c).await,
            InvocationConfig::RemoteAgent(c) => self.connectors.remote_agent.invoke(c).await,
            InvocationConfig::Flow(c) => {
                FlowConnector::new(Arc::new(self.clone()), self.settings.max_flow_depth)
                    .invoke(c)
                    .await
            }
        }
    }
}

#[async_trait]
impl ConversationLoop for Orchestrator {
    async fn run(
        &self,
        ctx: ConversationContext,
        messages: Vec<Message>,
    ) -> Result<LoopOutcome, OrchestratorError> {
        self.run_loop(&ctx, messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AgentCatalog, AgentDescriptor, AgentKind};
    use crate::channel::{ChannelError, NativeChannel, NativeResponse};
    use crate::conversation::Role;
    use crate::oracle::{Oracle, OracleError, ScriptedOracle};
    use crate::trace::TraceRecord;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    /// 内存原生通道：按 target id 返回回显或失败，并记录发送顺序
    #[derive(Default)]
    struct MemoryChannel {
        failing: Vec<String>,
        sent: Mutex<Vec<(String, Value)>>,
    }

    impl MemoryChannel {
        fn failing(ids: &[&str]) -> Self {
            Self {
                failing: ids.iter().map(|s| s.to_string()).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent_ids(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
        }
    }

    #[async_trait]
    impl NativeChannel for MemoryChannel {
        async fn send(&self, target_id: &str, message: Value) -> Result<NativeResponse, ChannelError> {
            self.sent.lock().unwrap().push((target_id.to_string(), message.clone()));
            if self.failing.iter().any(|f| f == target_id) {
                return Err(ChannelError::Timeout(target_id.to_string()));
            }
            Ok(NativeResponse {
                success: true,
                payload: json!(format!("{} handled {}", target_id, message)),
                elapsed_time: Some(0.1),
            })
        }
    }

    /// 永不返回的 Oracle，用于取消测试
    struct Stalled;

    #[async_trait]
    impl Oracle for Stalled {
        async fn decide(&self, _messages: &[Message], _tools: &[Value]) -> Result<Message, OracleError> {
            futures_util::future::pending().await
        }
    }

    /// 收到请求后永不回复的原生通道，用于调用中取消
    #[derive(Default)]
    struct StalledChannel {
        started: tokio::sync::Notify,
    }

    #[async_trait]
    impl NativeChannel for StalledChannel {
        async fn send(&self, _target_id: &str, _message: Value) -> Result<NativeResponse, ChannelError> {
            self.started.notify_one();
            futures_util::future::pending().await
        }
    }

    fn native(id: &str, name: &str) -> AgentDescriptor {
        AgentDescriptor::new(id, name, AgentKind::Native)
    }

    fn seed() -> Vec<Message> {
        vec![Message::system("route requests"), Message::user("summarize this")]
    }

    fn orchestrator(settings: LoopSettings) -> Orchestrator {
        Orchestrator::new(ConnectorSet::default(), settings)
    }

    fn ctx(
        agents: Vec<AgentDescriptor>,
        oracle: Arc<dyn Oracle>,
        channel: Arc<dyn NativeChannel>,
    ) -> ConversationContext {
        ConversationContext::new(AgentCatalog::new(agents), oracle, channel)
    }

    #[tokio::test]
    async fn test_no_calls_terminates_without_trace() {
        let oracle = Arc::new(ScriptedOracle::new().then_answer("Hello!"));
        let channel = Arc::new(MemoryChannel::default());
        let c = ctx(vec![native("a", "summarizer_aaaaaa")], oracle, channel.clone());
        let outcome = orchestrator(LoopSettings::default()).run_loop(&c, seed()).await.unwrap();
        assert_eq!(outcome.response, "Hello!");
        assert!(outcome.trace.is_empty());
        assert_eq!(outcome.termination, Termination::Completed);
        assert!(channel.sent_ids().is_empty());
    }

    #[tokio::test]
    async fn test_only_first_proposed_call_dispatched() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .then_call(vec![
                    ("summarizer_aaaaaa", json!({"text": "x"})),
                    ("translator_bbbbbb", json!({"text": "y"})),
                ])
                .then_answer("Summary ready"),
        );
        let channel = Arc::new(MemoryChannel::default());
        let c = ctx(
            vec![native("a", "summarizer_aaaaaa"), native("b", "translator_bbbbbb")],
            oracle.clone(),
            channel.clone(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let c = c.with_events(tx);
        let outcome = orchestrator(LoopSettings::default()).run_loop(&c, seed()).await.unwrap();

        assert_eq!(channel.sent_ids(), vec!["a"]);
        assert_eq!(outcome.trace.len(), 1);
        assert_eq!(outcome.trace[0].name, "summarizer");

        // 写回的 assistant 消息只保留被派发的调用，后面紧跟对应的 tool 消息
        let assistant = &outcome.messages[2];
        assert_eq!(assistant.calls.len(), 1);
        let tool = &outcome.messages[3];
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some(assistant.calls[0].call_id.as_str()));

        // 第二次询问 Oracle 时能看到调用结果
        let seen = oracle.observations();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].messages.last().map(|m| m.role), Some(Role::Tool));
        assert_eq!(seen[0].tool_names, vec!["summarizer_aaaaaa", "translator_bbbbbb"]);

        let mut discarded = None;
        while let Ok(ev) = rx.try_recv() {
            if let OrchestratorEvent::Discarded { agents, .. } = ev {
                discarded = Some(agents);
            }
        }
        assert_eq!(discarded, Some(vec!["translator_bbbbbb".to_string()]));
    }

    #[tokio::test]
    async fn test_failed_call_continues_loop() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .then_call(vec![("summarizer_aaaaaa", json!({}))])
                .then_answer("Sorry, the summarizer is down"),
        );
        let channel = Arc::new(MemoryChannel::failing(&["a"]));
        let c = ctx(vec![native("a", "summarizer_aaaaaa")], oracle, channel);
        let outcome = orchestrator(LoopSettings::default()).run_loop(&c, seed()).await.unwrap();
        assert_eq!(outcome.trace.len(), 1);
        assert!(!outcome.trace[0].success);
        assert_eq!(outcome.response, "Sorry, the summarizer is down");
        let tool = &outcome.messages[3];
        assert!(tool.text().starts_with("Unexpected error while invoking GenAI agent"));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_configuration_termination() {
        let oracle = Arc::new(ScriptedOracle::new().then_call(vec![("ghost_cccccc", json!({}))]));
        let c = ctx(vec![native("a", "summarizer_aaaaaa")], oracle.clone(), Arc::new(MemoryChannel::default()));
        let outcome = orchestrator(LoopSettings::default()).run_loop(&c, seed()).await.unwrap();
        assert!(matches!(outcome.termination, Termination::Configuration { .. }));
        assert!(outcome.trace.is_empty());
        assert!(outcome.response.contains("ghost_cccccc"));
        assert_eq!(oracle.remaining(), 0);
        assert_eq!(oracle.observations().len(), 1);
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .then_call(vec![("summarizer_aaaaaa", json!({}))])
                .then_call(vec![("summarizer_aaaaaa", json!({}))])
                .then_call(vec![("summarizer_aaaaaa", json!({}))]),
        );
        let channel = Arc::new(MemoryChannel::default());
        let c = ctx(vec![native("a", "summarizer_aaaaaa")], oracle.clone(), channel.clone());
        let settings = LoopSettings {
            max_iterations: 2,
            ..LoopSettings::default()
        };
        let outcome = orchestrator(settings).run_loop(&c, seed()).await.unwrap();
        assert_eq!(outcome.termination, Termination::IterationLimit { limit: 2 });
        assert_eq!(outcome.trace.len(), 2);
        assert_eq!(channel.sent_ids().len(), 2);
        assert!(outcome.response.contains("limit of 2"));
        assert_eq!(oracle.remaining(), 1);
    }

    #[tokio::test]
    async fn test_oracle_error_is_fatal() {
        let oracle = Arc::new(ScriptedOracle::new().then_fail(OracleError::Timeout));
        let c = ctx(vec![], oracle, Arc::new(MemoryChannel::default()));
        let err = orchestrator(LoopSettings::default()).run_loop(&c, seed()).await.unwrap_err();
        assert_eq!(err, OrchestratorError::oracle(OracleError::Timeout, vec![]));
    }

    #[tokio::test]
    async fn test_oracle_error_keeps_completed_dispatches() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .then_call(vec![("summarizer_aaaaaa", json!({"text": "x"}))])
                .then_fail(OracleError::Timeout),
        );
        let c = ctx(vec![native("a", "summarizer_aaaaaa")], oracle, Arc::new(MemoryChannel::default()));
        let err = orchestrator(LoopSettings::default()).run_loop(&c, seed()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Oracle { source: OracleError::Timeout, .. }));
        let partial = err.into_partial_trace();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0].name, "summarizer");
        assert!(partial[0].success);
    }

    #[tokio::test]
    async fn test_failed_flow_keeps_member_traces() {
        let agents = vec![
            native("a", "extract_aaaaaa"),
            AgentDescriptor::new("f", "pipeline_ffffff", AgentKind::Flow).with_members(vec!["a".into()]),
        ];
        let oracle = Arc::new(
            ScriptedOracle::new()
                .then_call(vec![("pipeline_ffffff", json!({}))])
                .then_call(vec![("extract_aaaaaa", json!({}))])
                .then_fail(OracleError::Timeout)
                .then_answer("flow failed"),
        );
        let c = ctx(agents, oracle, Arc::new(MemoryChannel::default()));
        let outcome = orchestrator(LoopSettings::default()).run_loop(&c, seed()).await.unwrap();
        assert_eq!(outcome.response, "flow failed");

        let flow = &outcome.trace[0];
        assert!(!flow.success);
        let nested = flow.nested().unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].name, "extract");
        assert!(outcome.messages[3].text().starts_with("Unexpected error while running flow"));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let c = ctx(vec![], Arc::new(ScriptedOracle::new()), Arc::new(MemoryChannel::default()))
            .with_cancel(token);
        let err = orchestrator(LoopSettings::default()).run_loop(&c, seed()).await.unwrap_err();
        assert_eq!(err, OrchestratorError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_while_oracle_pending() {
        let token = CancellationToken::new();
        let c = ctx(vec![], Arc::new(Stalled), Arc::new(MemoryChannel::default()))
            .with_cancel(token.clone());
        let orch = orchestrator(LoopSettings::default());
        let handle = tokio::spawn(async move { orch.run_loop(&c, seed()).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        token.cancel();
        let result = handle.await.unwrap();
        assert_eq!(result.unwrap_err(), OrchestratorError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_while_call_in_flight() {
        let token = CancellationToken::new();
        let oracle = Arc::new(ScriptedOracle::new().then_call(vec![("summarizer_aaaaaa", json!({}))]));
        let channel = Arc::new(StalledChannel::default());
        let c = ctx(vec![native("a", "summarizer_aaaaaa")], oracle, channel.clone())
            .with_cancel(token.clone());
        let orch = orchestrator(LoopSettings::default());
        let handle = tokio::spawn(async move { orch.run_loop(&c, seed()).await });

        channel.started.notified().await;
        token.cancel();
        let result = handle.await.unwrap();
        // 被取消的调用没有轨迹，也不会带出部分轨迹
        let err = result.unwrap_err();
        assert_eq!(err, OrchestratorError::Cancelled);
        assert!(err.into_partial_trace().is_empty());
    }

    #[tokio::test]
    async fn test_flow_nests_member_traces() {
        let agents = vec![
            native("a", "extract_aaaaaa"),
            native("b", "classify_bbbbbb"),
            native("c", "report_cccccc"),
            AgentDescriptor::new("f", "pipeline_ffffff", AgentKind::Flow)
                .with_members(vec!["a".into(), "b".into(), "c".into()]),
        ];
        let oracle = Arc::new(
            ScriptedOracle::new()
                .then_call(vec![("pipeline_ffffff", json!({"text": "doc"}))])
                .then_call(vec![("extract_aaaaaa", json!({}))])
                .then_call(vec![("classify_bbbbbb", json!({}))])
                .then_call(vec![("report_cccccc", json!({}))])
                .then_answer("flow report")
                .then_answer("Here is your report"),
        );
        let channel = Arc::new(MemoryChannel::failing(&["b"]));
        let c = ctx(agents, oracle.clone(), channel.clone());
        let outcome = orchestrator(LoopSettings::default()).run_loop(&c, seed()).await.unwrap();

        assert_eq!(outcome.response, "Here is your report");
        assert_eq!(outcome.trace.len(), 1);
        let flow = &outcome.trace[0];
        assert_eq!(flow.kind, AgentKind::Flow);
        assert!(flow.success);
        let nested: Vec<bool> = flow.nested().unwrap().iter().map(|r| r.success).collect();
        assert_eq!(nested, vec![true, false, true]);
        assert_eq!(channel.sent_ids(), vec!["a", "b", "c"]);

        // 嵌套循环只看到成员工具，且历史中不含触发 flow 的 assistant 消息
        let seen = oracle.observations();
        assert_eq!(seen[1].tool_names, vec!["extract_aaaaaa", "classify_bbbbbb", "report_cccccc"]);
        assert_eq!(seen[1].messages.len(), 2);
        assert_eq!(seen[1].messages[1].role, Role::User);

        // 父对话中 flow 的结果是子循环最终回复
        assert_eq!(outcome.messages[3].text(), "flow report");
    }

    #[tokio::test]
    async fn test_cyclic_flow_stops_at_depth_limit() {
        let agents = vec![AgentDescriptor::new("f", "loop_ffffff", AgentKind::Flow)
            .with_members(vec!["f".into()])];
        let oracle = Arc::new(
            ScriptedOracle::new()
                .then_call(vec![("loop_ffffff", json!({}))])
                .then_call(vec![("loop_ffffff", json!({}))])
                .then_call(vec![("loop_ffffff", json!({}))])
                .then_answer("depth 2")
                .then_answer("depth 1")
                .then_answer("top"),
        );
        let c = ctx(agents, oracle, Arc::new(MemoryChannel::default()));
        let settings = LoopSettings {
            max_flow_depth: 2,
            ..LoopSettings::default()
        };
        let outcome = orchestrator(settings).run_loop(&c, seed()).await.unwrap();
        assert_eq!(outcome.response, "top");

        let depth1 = &outcome.trace[0];
        let depth2 = &depth1.nested().unwrap()[0];
        let guarded: &TraceRecord = &depth2.nested().unwrap()[0];
        assert!(depth1.success && depth2.success);
        assert!(!guarded.success);
        assert!(guarded.nested().is_none());
    }

    #[tokio::test]
    async fn test_events_report_depth() {
        let agents = vec![
            native("a", "extract_aaaaaa"),
            AgentDescriptor::new("f", "pipeline_ffffff", AgentKind::Flow).with_members(vec!["a".into()]),
        ];
        let oracle = Arc::new(
            ScriptedOracle::new()
                .then_call(vec![("pipeline_ffffff", json!({}))])
                .then_call(vec![("extract_aaaaaa", json!({}))])
                .then_answer("inner")
                .then_answer("outer"),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let c = ctx(agents, oracle, Arc::new(MemoryChannel::default())).with_events(tx);
        orchestrator(LoopSettings::default()).run_loop(&c, seed()).await.unwrap();

        let mut finished = Vec::new();
        let mut calls = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            match ev {
                OrchestratorEvent::Finished { depth, .. } => finished.push(depth),
                OrchestratorEvent::AgentCall { depth, agent, .. } => calls.push((depth, agent)),
                _ => {}
            }
        }
        assert_eq!(finished, vec![1, 0]);
        assert_eq!(
            calls,
            vec![(0, "pipeline".to_string()), (1, "extract".to_string())]
        );
    }
}
