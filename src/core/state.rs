//! 对话状态与循环阶段
//!
//! ConversationState 每轮对话创建一次：消息只追加，轨迹只追加，阶段 SELECT -> DISPATCH -> SELECT ... -> TERMINATED。

use serde::Serialize;

use crate::conversation::{Message, Role};
use crate::trace::{TraceCollector, TraceRecord};

/// 循环阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopPhase {
    Select,
    Dispatch,
    Terminated,
}

/// 终止原因
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// Oracle 不再提议调用
    Completed,
    /// 达到最大派发次数
    IterationLimit { limit: usize },
    /// 动作名无法解析或类型不支持
    Configuration { detail: String },
}

impl Termination {
    pub fn is_completed(&self) -> bool {
        matches!(self, Termination::Completed)
    }
}

/// 单轮对话的状态
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
    trace: TraceCollector,
    phase: LoopPhase,
}

impl ConversationState {
    pub fn new(seed: Vec<Message>) -> Self {
        Self {
            messages: seed,
            trace: TraceCollector::new(),
            phase: LoopPhase::Select,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn trace(&self) -> &TraceCollector {
        &self.trace
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == LoopPhase::Terminated
    }

    /// 已完成的派发次数（每次 DISPATCH 恰好一条轨迹）
    pub fn dispatch_count(&self) -> usize {
        self.trace.len()
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn record(&mut self, record: TraceRecord) {
        self.trace.push(record);
    }

    pub fn enter(&mut self, phase: LoopPhase) {
        debug_assert!(
            self.phase != LoopPhase::Terminated,
            "terminated state cannot transition"
        );
        self.phase = phase;
    }

    /// 最后一条 assistant 消息的文本
    pub fn last_assistant_text(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(Message::text)
            .unwrap_or_default()
    }

    pub fn into_outcome(self, termination: Termination) -> LoopOutcome {
        let response = self.last_assistant_text();
        LoopOutcome {
            response,
            messages: self.messages,
            trace: self.trace.into_records(),
            termination,
        }
    }
}

/// 循环结束后交给调用方的结果
#[derive(Debug, Clone, Serialize)]
pub struct LoopOutcome {
    /// 最终 assistant 消息的内容
    pub response: String,
    pub messages: Vec<Message>,
    pub trace: Vec<TraceRecord>,
    pub termination: Termination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase_is_select() {
        let state = ConversationState::new(vec![Message::user("hi")]);
        assert_eq!(state.phase(), LoopPhase::Select);
        assert_eq!(state.dispatch_count(), 0);
    }

    #[test]
    fn test_outcome_uses_last_assistant_message() {
        let mut state = ConversationState::new(vec![Message::user("hi")]);
        state.push_message(Message::assistant("first"));
        state.push_message(Message::tool("c1", "x", "obs"));
        state.push_message(Message::assistant("final"));
        state.enter(LoopPhase::Terminated);
        let outcome = state.into_outcome(Termination::Completed);
        assert_eq!(outcome.response, "final");
        assert_eq!(outcome.messages.len(), 4);
    }

    #[test]
    fn test_termination_serialization() {
        let v = serde_json::to_value(Termination::IterationLimit { limit: 3 }).unwrap();
        assert_eq!(v, serde_json::json!({"reason": "iteration_limit", "limit": 3}));
    }
}
