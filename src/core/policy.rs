//! 派发策略
//!
//! 每轮 SELECT 只处理一个提议；同一轮中的其余提议被丢弃（记录 warn 与 Discarded 事件）。
//! 策略是可替换的 trait，默认 FIRST_CALL_ONLY。

use crate::conversation::ToolCall;

pub trait DispatchPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 从本轮提议中选出要派发的一个；None 表示不派发
    fn select<'a>(&self, calls: &'a [ToolCall]) -> Option<&'a ToolCall>;
}

/// 只派发第一个提议
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstCallOnly;

impl DispatchPolicy for FirstCallOnly {
    fn name(&self) -> &'static str {
        "first_call_only"
    }

    fn select<'a>(&self, calls: &'a [ToolCall]) -> Option<&'a ToolCall> {
        calls.first()
    }
}

/// 默认派发策略
pub const FIRST_CALL_ONLY: FirstCallOnly = FirstCallOnly;
