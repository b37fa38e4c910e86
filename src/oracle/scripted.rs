//! 脚本化 Oracle（用于测试与离线演示，无需 API）
//!
//! 按顺序弹出预置决策；脚本耗尽后返回一条无调用的最终回复。
//! 每次调用记录收到的消息与工具名，便于断言嵌套 flow 的输入。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::conversation::{Message, ToolCall};
use crate::oracle::{Oracle, OracleError};

/// 脚本中的一步
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Reply(Message),
    Fail(OracleError),
}

/// 一次 decide 调用的观测
#[derive(Debug, Clone)]
pub struct OracleObservation {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ScriptedOracle {
    steps: Mutex<VecDeque<ScriptStep>>,
    observed: Mutex<Vec<OracleObservation>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一步：提议若干调用（按 (name, arguments) 顺序生成 call_id）
    pub fn then_call(self, calls: Vec<(&str, Value)>) -> Self {
        let calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall::new(format!("call_{}_{}", name, i), name, args))
            .collect();
        self.push(ScriptStep::Reply(Message::assistant_with_calls("", calls)))
    }

    /// 追加一步：最终回复（无调用，循环终止）
    pub fn then_answer(self, text: &str) -> Self {
        self.push(ScriptStep::Reply(Message::assistant(text)))
    }

    pub fn then_fail(self, error: OracleError) -> Self {
        self.push(ScriptStep::Fail(error))
    }

    fn push(self, step: ScriptStep) -> Self {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
        self
    }

    pub fn observations(&self) -> Vec<OracleObservation> {
        self.observed.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().map(|s| s.len()).unwrap_or(0)
    }
}

fn tool_name(def: &Value) -> String {
    def.pointer("/function/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn decide(&self, messages: &[Message], tools: &[Value]) -> Result<Message, OracleError> {
        if let Ok(mut observed) = self.observed.lock() {
            observed.push(OracleObservation {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(tool_name).collect(),
            });
        }
        let step = self.steps.lock().ok().and_then(|mut s| s.pop_front());
        match step {
            Some(ScriptStep::Reply(m)) => Ok(m),
            Some(ScriptStep::Fail(e)) => Err(e),
            None => Ok(Message::assistant("done")),
        }
    }
}
