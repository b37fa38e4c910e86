//! 调用轨迹：每次 DISPATCH 追加一条 TraceRecord
//!
//! flow 的记录不是标量输出，而是嵌套循环的完整 TraceRecord 列表（不展平），以保留归属。
//! 轨迹只写不读：循环本身从不依据轨迹决策，结束时整体返回给调用方。

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::AgentKind;

/// 记录的输出：普通智能体为标量 JSON，flow 为嵌套记录列表
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceOutput {
    Flow { flow: Vec<TraceRecord> },
    Value { output: Value },
}

impl Default for TraceOutput {
    fn default() -> Self {
        TraceOutput::Value {
            output: Value::Null,
        }
    }
}

/// 一次调用的审计记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub input: Value,
    #[serde(flatten)]
    pub output: TraceOutput,
    #[serde(alias = "is_success")]
    pub success: bool,
    /// 本地测得的耗时
    #[serde(default)]
    pub duration_ms: u64,
    /// 原生通道回报的远端执行时间（秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl TraceRecord {
    /// 调用开始前的草稿：输出为空、success=false，由 complete / fail / nest 收尾
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: AgentKind, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            url: None,
            input,
            output: TraceOutput::default(),
            success: false,
            duration_ms: 0,
            execution_time: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_execution_time(mut self, seconds: Option<f64>) -> Self {
        self.execution_time = seconds;
        self
    }

    pub fn complete(mut self, success: bool, output: Value, started: Instant) -> Self {
        self.output = TraceOutput::Value { output };
        self.success = success;
        self.duration_ms = started.elapsed().as_millis() as u64;
        self
    }

    pub fn fail(self, message: &str, started: Instant) -> Self {
        self.complete(false, Value::String(message.to_string()), started)
    }

    /// flow 收尾：挂上嵌套循环的整条轨迹
    pub fn nest(mut self, records: Vec<TraceRecord>, started: Instant) -> Self {
        self.output = TraceOutput::Flow { flow: records };
        self.success = true;
        self.duration_ms = started.elapsed().as_millis() as u64;
        self
    }

    /// 子循环中途失败：保留已完成的成员记录，整体记为失败
    pub fn nest_failed(self, records: Vec<TraceRecord>, started: Instant) -> Self {
        let mut record = self.nest(records, started);
        record.success = false;
        record
    }

    /// flow 记录的嵌套列表；标量记录返回 None
    pub fn nested(&self) -> Option<&[TraceRecord]> {
        match &self.output {
            TraceOutput::Flow { flow } => Some(flow),
            TraceOutput::Value { .. } => None,
        }
    }

    pub fn output_value(&self) -> Option<&Value> {
        match &self.output {
            TraceOutput::Value { output } => Some(output),
            TraceOutput::Flow { .. } => None,
        }
    }
}

/// 只追加的轨迹收集器，顺序即派发顺序
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceCollector {
    records: Vec<TraceRecord>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<TraceRecord> {
        self.records
    }
}
