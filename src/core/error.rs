//! 错误类型
//!
//! AgentError：默认推理引擎内部错误（工具、解析、LLM、步数上限），在引擎边界转为文本交给分类器；
//! LifecycleError：资源构建失败或前置条件不满足；TurnError：单轮问答失败。

use thiserror::Error;

use crate::core::{ClassifiedError, ResourceState};

/// 推理引擎运行过程中可能出现的错误；Display 文本会被分类器按关键词匹配
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool execution failed: tool '{0}' timed out")]
    ToolTimeout(String),

    #[error("Tool execution failed: unknown tool '{0}'")]
    HallucinatedTool(String),

    #[error("Output parsing failed: {0}")]
    JsonParseError(String),

    #[error("{0}")]
    LlmError(String),

    #[error("Agent stopped after {0} steps without a final answer")]
    StepLimit(usize),
}

/// 资源生命周期操作的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("API key is missing")]
    MissingApiKey,

    /// 依赖的前一级资源尚未就绪
    #[error("resources not ready (current state: {0:?})")]
    NotReady(ResourceState),

    #[error(transparent)]
    Classified(#[from] ClassifiedError),
}

impl LifecycleError {
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingApiKey => "Please enter your API key to proceed (/key <value>).".to_string(),
            Self::NotReady(state) => not_ready_message(*state).to_string(),
            Self::Classified(e) => e.user_message(),
        }
    }
}

/// 单轮问答的错误：未就绪的守卫、惰性重建 Agent 失败、或调用本身失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    #[error("not ready: {0:?}")]
    NotReady(ResourceState),

    #[error(transparent)]
    Lifecycle(LifecycleError),

    #[error(transparent)]
    Invocation(ClassifiedError),
}

impl TurnError {
    pub fn user_message(&self) -> String {
        match self {
            Self::NotReady(state) => not_ready_message(*state).to_string(),
            Self::Lifecycle(e) => e.user_message(),
            Self::Invocation(e) => e.user_message(),
        }
    }
}

/// 各就绪阶段缺失时的守卫提示
pub fn not_ready_message(state: ResourceState) -> &'static str {
    match state {
        ResourceState::Uninitialized => {
            "AI engine is not active. Please enter your API key (/key <value>)."
        }
        ResourceState::ClientReady => {
            "Database toolkit is missing. Please connect to the database (/connect)."
        }
        ResourceState::ToolkitReady => "Agent is not initialized. Please reload the connection (/connect).",
        ResourceState::AgentReady => "System is ready.",
    }
}
