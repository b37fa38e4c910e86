//! 智能体目录：描述符、快照、别名与目录查询客户端

pub mod alias;
pub mod descriptor;
pub mod directory;

pub use alias::{generate_alias, strip_alias_suffix};
pub use descriptor::{AgentCatalog, AgentDescriptor, AgentFilter, AgentKind};
pub use directory::{AgentDirectory, DirectoryError, HttpAgentDirectory, StaticDirectory};
