//! 资源就绪阶梯：Uninitialized → ClientReady → ToolkitReady → AgentReady
//!
//! Resources 的每个变体只携带该阶段合法的资源，「Agent 已就绪但 Toolkit 为空」之类的状态无法表示。
//! 迁移函数都是 (当前状态, 事件) → 新状态 的纯函数。

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::core::Language;
use crate::llm::LlmClient;
use crate::react::ReasoningAgent;
use crate::tools::SqlToolkit;

/// 由 Resources 推导出的四级就绪状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResourceState {
    Uninitialized,
    ClientReady,
    ToolkitReady,
    AgentReady,
}

/// 已构建的 Agent 及其构建时绑定的语言与系统指令
#[derive(Clone)]
pub struct BuiltAgent {
    pub id: Uuid,
    pub agent: Arc<dyn ReasoningAgent>,
    pub language: Language,
    pub instructions: String,
}

impl BuiltAgent {
    pub fn new(agent: Arc<dyn ReasoningAgent>, language: Language, instructions: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent,
            language,
            instructions,
        }
    }
}

impl fmt::Debug for BuiltAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltAgent")
            .field("id", &self.id)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// 会话持有的资源
#[derive(Clone, Default)]
pub enum Resources {
    #[default]
    Uninitialized,
    ClientReady {
        client: Arc<dyn LlmClient>,
    },
    ToolkitReady {
        client: Arc<dyn LlmClient>,
        toolkit: Arc<SqlToolkit>,
    },
    AgentReady {
        client: Arc<dyn LlmClient>,
        toolkit: Arc<SqlToolkit>,
        agent: BuiltAgent,
    },
}

impl Resources {
    pub fn state(&self) -> ResourceState {
        match self {
            Self::Uninitialized => ResourceState::Uninitialized,
            Self::ClientReady { .. } => ResourceState::ClientReady,
            Self::ToolkitReady { .. } => ResourceState::ToolkitReady,
            Self::AgentReady { .. } => ResourceState::AgentReady,
        }
    }

    pub fn client(&self) -> Option<&Arc<dyn LlmClient>> {
        match self {
            Self::Uninitialized => None,
            Self::ClientReady { client }
            | Self::ToolkitReady { client, .. }
            | Self::AgentReady { client, .. } => Some(client),
        }
    }

    pub fn toolkit(&self) -> Option<&Arc<SqlToolkit>> {
        match self {
            Self::ToolkitReady { toolkit, .. } | Self::AgentReady { toolkit, .. } => Some(toolkit),
            _ => None,
        }
    }

    pub fn agent(&self) -> Option<&BuiltAgent> {
        match self {
            Self::AgentReady { agent, .. } => Some(agent),
            _ => None,
        }
    }

    /// Uninitialized + 客户端 → ClientReady；其它状态保持不变
    pub fn with_client(self, client: Arc<dyn LlmClient>) -> Self {
        match self {
            Self::Uninitialized => Self::ClientReady { client },
            other => other,
        }
    }

    /// ClientReady + Toolkit → ToolkitReady；其它状态保持不变
    pub fn with_toolkit(self, toolkit: Arc<SqlToolkit>) -> Self {
        match self {
            Self::ClientReady { client } => Self::ToolkitReady { client, toolkit },
            other => other,
        }
    }

    /// ToolkitReady + Agent → AgentReady；其它状态保持不变
    pub fn with_agent(self, agent: BuiltAgent) -> Self {
        match self {
            Self::ToolkitReady { client, toolkit } => Self::AgentReady {
                client,
                toolkit,
                agent,
            },
            other => other,
        }
    }

    /// 丢弃 Agent，保留客户端与 Toolkit
    pub fn without_agent(self) -> Self {
        match self {
            Self::AgentReady {
                client, toolkit, ..
            } => Self::ToolkitReady { client, toolkit },
            other => other,
        }
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resources")
            .field("state", &self.state())
            .field("agent", &self.agent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_with_toolkit_requires_client() {
        let toolkit = Arc::new(SqlToolkit::in_memory_for_tests());
        let r = Resources::Uninitialized.with_toolkit(toolkit);
        assert_eq!(r.state(), ResourceState::Uninitialized);
        assert!(r.toolkit().is_none());
    }

    #[test]
    fn test_ladder_moves_forward_in_order() {
        let client: Arc<dyn LlmClient> = Arc::new(MockLlmClient);
        let toolkit = Arc::new(SqlToolkit::in_memory_for_tests());
        let r = Resources::Uninitialized.with_client(client);
        assert_eq!(r.state(), ResourceState::ClientReady);
        let r = r.with_toolkit(toolkit);
        assert_eq!(r.state(), ResourceState::ToolkitReady);
        assert!(r.client().is_some());
        assert!(r.toolkit().is_some());
        assert!(r.agent().is_none());
        let r = r.without_agent();
        assert_eq!(r.state(), ResourceState::ToolkitReady);
    }

    #[test]
    fn test_state_ordering() {
        assert!(ResourceState::Uninitialized < ResourceState::ClientReady);
        assert!(ResourceState::ToolkitReady < ResourceState::AgentReady);
    }
}
