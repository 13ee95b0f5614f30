//! 核心层：会话与资源阶梯、生命周期管理、错误分类、命令编排

pub mod classifier;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod session;
pub mod state;

pub use classifier::{ClassifiedError, ErrorCategory, ErrorClassifier, Rule, RuleTable, Stage};
pub use error::{not_ready_message, AgentError, LifecycleError, TurnError};
pub use lifecycle::{ConnectOutcome, ResourceManager};
pub use orchestrator::{Command, Orchestrator, Reply, HELP_TEXT};
pub use session::{ApiKey, Language, Session, SessionSnapshot};
pub use state::{BuiltAgent, ResourceState, Resources};
