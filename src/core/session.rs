//! 会话：单个用户的全部状态（资源阶梯、语言偏好、对话历史、API Key）
//!
//! 会话以 `&mut Session` 显式传入每个生命周期与编排操作，不存在全局可变状态。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::{ResourceState, Resources};
use crate::memory::ConversationHistory;

/// 最终回答使用的语言（固定小集合）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Indonesian,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Indonesian => "Indonesian",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Self::English),
            "indonesian" | "id" | "bahasa" => Ok(Self::Indonesian),
            other => Err(format!(
                "unknown language '{other}', expected one of: English, Indonesian"
            )),
        }
    }
}

/// API Key：Debug 输出时隐藏内容
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// 单个用户会话
#[derive(Debug)]
pub struct Session {
    id: String,
    pub(crate) resources: Resources,
    pub(crate) language: Language,
    pub(crate) history: ConversationHistory,
    pub(crate) api_key: Option<ApiKey>,
}

impl Session {
    pub fn new(language: Language) -> Self {
        let id = format!("session_{}", uuid::Uuid::new_v4());
        tracing::debug!(session = %id, "session created");
        Self {
            id,
            resources: Resources::Uninitialized,
            language,
            history: ConversationHistory::new(),
            api_key: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ResourceState {
        self.resources.state()
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            state: self.state(),
            language: self.language,
            agent_language: self.resources.agent().map(|a| a.language),
            history_len: self.history.len(),
            has_api_key: self.api_key.as_ref().is_some_and(|k| !k.is_blank()),
            token_usage: self.resources.client().map(|c| c.token_usage()),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Language::default())
    }
}

/// 会话的可序列化投影（供 /status 展示）
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub state: ResourceState,
    pub language: Language,
    pub agent_language: Option<Language>,
    pub history_len: usize,
    pub has_api_key: bool,
    /// 模型客户端累计用量 (prompt, completion, total)
    pub token_usage: Option<(u64, u64, u64)>,
}
