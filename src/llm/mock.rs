//! Mock LLM 客户端（用于测试与离线演示，无需 API）
//!
//! - MockLlmClient：取最后一条 User 消息，直接给出带 Final Answer 标记的回复
//! - ScriptedLlmClient：按顺序返回预置输出，用于驱动确定性的 ReAct 流程

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

/// Mock 客户端：回显用户最后一条消息作为最终回答
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("Final Answer: (mock) you asked: {last_user}"))
    }
}

/// 预置脚本客户端：每次 complete 弹出一条输出；脚本耗尽时返回错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    outputs: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outputs: Mutex::new(outputs.into_iter().map(|s| Ok(s.into())).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 在脚本末尾追加一次失败
    pub fn then_fail(self, error: impl Into<String>) -> Self {
        if let Ok(mut q) = self.outputs.lock() {
            q.push_back(Err(error.into()));
        }
        self
    }

    /// 已被调用的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self
            .outputs
            .lock()
            .map_err(|_| "scripted client lock poisoned".to_string())?;
        queue
            .pop_front()
            .unwrap_or_else(|| Err("scripted client has no more outputs".to_string()))
    }
}
