//! 对话层：消息模型

pub mod message;

pub use message::{Content, Message, Role, ToolCall};
