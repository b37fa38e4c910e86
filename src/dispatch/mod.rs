//! 派发层：调用配置与动作解析

pub mod invocation;
pub mod resolver;

pub use invocation::{
    A2aMessage, A2aPart, FlowConfig, InvocationConfig, NativeConfig, RemoteAgentConfig,
    ToolServerConfig,
};
pub use resolver::{instruction_from, Resolver};
