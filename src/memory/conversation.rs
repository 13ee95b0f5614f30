//! 短期记忆：对话历史
//!
//! 会话内按时间顺序保存 user / assistant 轮次，仅追加；每次调用 Agent 时整体重放，不做剪枝。
//! 另含发往 LLM 的聊天消息（Message / Role）。

use serde::{Deserialize, Serialize};

use crate::memory::AgentMessage;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 发往 LLM 的单条聊天消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 对话轮次的角色：只有用户与助手两种
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// 会话中保存的一轮对话
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    /// 转为 Agent 原生消息（角色保持不变）
    pub fn to_agent_message(&self) -> AgentMessage {
        match self.role {
            TurnRole::User => AgentMessage::human(self.content.clone()),
            TurnRole::Assistant => AgentMessage::ai(self.content.clone()),
        }
    }
}

/// 对话历史：只追加、保序，只有 reset 才会清空
#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// 按原顺序映射为 Agent 原生消息列表；纯函数
    pub fn to_model_messages(&self) -> Vec<AgentMessage> {
        self.turns.iter().map(Turn::to_agent_message).collect()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
