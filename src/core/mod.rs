//! 核心编排层：错误、对话状态、上下文、事件、派发策略、主控循环

pub mod context;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod policy;
pub mod state;

pub use context::ConversationContext;
pub use error::OrchestratorError;
pub use events::OrchestratorEvent;
pub use orchestrator::{ConversationLoop, LoopSettings, Orchestrator};
pub use policy::{DispatchPolicy, FirstCallOnly, FIRST_CALL_ONLY};
pub use state::{ConversationState, LoopOutcome, LoopPhase, Termination};
