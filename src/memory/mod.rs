//! 记忆层：会话对话历史与 Agent 原生消息

pub mod conversation;
pub mod message;

pub use conversation::{ConversationHistory, Message, Role, Turn, TurnRole};
pub use message::{AgentMessage, ToolCall};
