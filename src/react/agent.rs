//! 推理 Agent
//!
//! 对核心而言 Agent 是不透明的可调用对象：给定完整消息历史，返回「历史 + 新消息」。
//! 默认实现 ReactAgent：Plan -> Act (Tool) -> Observe 循环，直到模型给出纯文本回复或达到步数上限。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{AgentMessage, Message, ToolCall};
use crate::react::{build_system_prompt, parse_llm_output, PlannerOutput};
use crate::tools::{ToolExecutor, ToolRegistry};

/// 推理 Agent：失败以文本返回，由分类器映射到 Invocation 阶段的类别
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    async fn invoke(&self, messages: Vec<AgentMessage>) -> Result<Vec<AgentMessage>, String>;
}

/// Agent 工厂：绑定客户端、工具集与固定系统指令
pub trait AgentFactory: Send + Sync {
    fn build(
        &self,
        client: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        instructions: &str,
    ) -> Result<Arc<dyn ReasoningAgent>, String>;
}

/// JSON Tool Call 风格的 ReAct Agent
pub struct ReactAgent {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    system_prompt: String,
    max_steps: usize,
}

impl ReactAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        instructions: &str,
        max_steps: usize,
        tool_timeout_secs: u64,
    ) -> Self {
        let system_prompt = build_system_prompt(instructions, &tools);
        Self {
            llm,
            executor: ToolExecutor::new(tools, tool_timeout_secs),
            system_prompt,
            max_steps,
        }
    }

    /// 把 Agent 消息渲染为聊天消息：工具调用写成 JSON，工具结果写成 Observation
    fn render(&self, messages: &[AgentMessage]) -> Vec<Message> {
        let mut chat = Vec::with_capacity(messages.len() + 1);
        chat.push(Message::system(self.system_prompt.clone()));
        for m in messages {
            let msg = match m {
                AgentMessage::System { content } => Message::system(content.clone()),
                AgentMessage::Human { content } => Message::user(content.clone()),
                AgentMessage::Ai {
                    content,
                    tool_calls,
                } if !tool_calls.is_empty() => {
                    let calls: Vec<String> = tool_calls
                        .iter()
                        .map(|c| serde_json::json!({ "tool": c.name, "args": c.args }).to_string())
                        .collect();
                    let mut text = content.trim().to_string();
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&calls.join("\n"));
                    Message::assistant(text)
                }
                AgentMessage::Ai { content, .. } => Message::assistant(content.clone()),
                AgentMessage::Tool { name, content, .. } => {
                    Message::user(format!("Observation from {}: {}", name, content))
                }
            };
            chat.push(msg);
        }
        chat
    }

    async fn run(&self, messages: &mut Vec<AgentMessage>) -> Result<(), AgentError> {
        for step in 0..self.max_steps {
            let output = self
                .llm
                .complete(&self.render(messages))
                .await
                .map_err(AgentError::LlmError)?;
            tracing::debug!(step, chars = output.len(), "model output");

            match parse_llm_output(&output)? {
                PlannerOutput::Response(text) => {
                    messages.push(AgentMessage::ai(text));
                    return Ok(());
                }
                PlannerOutput::ToolCall { call, thought } => {
                    if let Some(thought) = thought {
                        messages.push(AgentMessage::ai(thought));
                    }
                    let call = ToolCall::new(call.tool, call.args);
                    messages.push(AgentMessage::ai_tool_calls(vec![call.clone()]));

                    // 工具失败/超时写回 Observation 让模型自行修正；调用不存在的工具则终止本轮
                    let observation = match self.executor.execute(&call.name, call.args.clone()).await {
                        Ok(result) => result,
                        Err(e @ AgentError::HallucinatedTool(_)) => return Err(e),
                        Err(e) => format!("Error: {e}"),
                    };
                    messages.push(AgentMessage::tool(&call, observation));
                }
            }
        }
        Err(AgentError::StepLimit(self.max_steps))
    }
}

#[async_trait]
impl ReasoningAgent for ReactAgent {
    async fn invoke(&self, mut messages: Vec<AgentMessage>) -> Result<Vec<AgentMessage>, String> {
        self.run(&mut messages).await.map_err(|e| e.to_string())?;
        Ok(messages)
    }
}

impl fmt::Debug for ReactAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactAgent")
            .field("tools", &self.executor.tool_names())
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

/// 默认工厂：构建 ReactAgent
#[derive(Debug, Clone)]
pub struct ReactAgentFactory {
    pub max_steps: usize,
    pub tool_timeout_secs: u64,
}

impl AgentFactory for ReactAgentFactory {
    fn build(
        &self,
        client: Arc<dyn LlmClient>,
        tools: ToolRegistry,
        instructions: &str,
    ) -> Result<Arc<dyn ReasoningAgent>, String> {
        if tools.is_empty() {
            return Err("get_tools returned no tools for the agent".to_string());
        }
        if self.max_steps == 0 {
            return Err("invalid argument: max_steps must be at least 1".to_string());
        }
        Ok(Arc::new(ReactAgent::new(
            client,
            tools,
            instructions,
            self.max_steps,
            self.tool_timeout_secs,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::{SqlDatabase, SqlToolkit};
    use rusqlite::Connection;

    fn toolkit() -> SqlToolkit {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE x (id INTEGER); INSERT INTO x VALUES (1), (2);")
            .unwrap();
        SqlToolkit::new(
            SqlDatabase::from_connection(conn, 1, 100),
            Arc::new(crate::llm::MockLlmClient),
        )
    }

    fn agent(llm: Arc<ScriptedLlmClient>, max_steps: usize) -> ReactAgent {
        ReactAgent::new(llm, toolkit().get_tools().unwrap(), "be precise", max_steps, 5)
    }

    #[tokio::test]
    async fn test_tool_then_answer() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "sql_db_query", "args": {"query": "SELECT count(*) FROM x"}}"#,
            "Final Answer: 2 rows.",
        ]));
        let out = agent(llm.clone(), 5)
            .invoke(vec![AgentMessage::human("how many?")])
            .await
            .unwrap();

        assert_eq!(out.len(), 4);
        assert_eq!(out[0], AgentMessage::human("how many?"));
        assert_eq!(out[1].tool_calls()[0].name, "sql_db_query");
        assert!(out[2].is_tool_result());
        assert_eq!(out[2].content(), "[[2]]");
        assert_eq!(out[3], AgentMessage::ai("Final Answer: 2 rows."));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_thought_before_tool_call() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Let me list the tables.\n{\"tool\": \"sql_db_list_tables\", \"args\": {}}",
            "Final Answer: x",
        ]));
        let out = agent(llm, 5).invoke(vec![]).await.unwrap();
        assert_eq!(out[0], AgentMessage::ai("Let me list the tables."));
        assert_eq!(out[1].tool_calls().len(), 1);
        assert_eq!(out[2].content(), "x");
    }

    #[tokio::test]
    async fn test_sql_error_is_observation() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "sql_db_query", "args": {"query": "SELECT * FROM nope"}}"#,
            "Final Answer: sorry",
        ]));
        let out = agent(llm, 5).invoke(vec![]).await.unwrap();
        assert!(out[1].content().starts_with("Error:"));
        assert!(out[1].content().contains("no such table"));
    }

    #[tokio::test]
    async fn test_runaway_query_times_out_as_observation() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "sql_db_query", "args": {"query": "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x+1 FROM c) SELECT count(*) FROM c"}}"#,
            r#"{"tool": "sql_db_query", "args": {"query": "SELECT count(*) FROM x"}}"#,
            "Final Answer: 2 rows.",
        ]));
        let agent = ReactAgent::new(llm, toolkit().get_tools().unwrap(), "be precise", 5, 1);
        let out = tokio::time::timeout(std::time::Duration::from_secs(10), agent.invoke(vec![]))
            .await
            .expect("turn must finish once the tool timeout fires")
            .unwrap();

        assert_eq!(
            out[1].content(),
            "Error: Tool execution failed: tool 'sql_db_query' timed out"
        );
        // 超时的语句已被中断，同一连接上的下一次查询正常返回
        assert_eq!(out[3].content(), "[[2]]");
        assert_eq!(out[4], AgentMessage::ai("Final Answer: 2 rows."));
    }

    #[tokio::test]
    async fn test_unknown_tool_fails() {
        let llm = Arc::new(ScriptedLlmClient::new([r#"{"tool": "drop_db", "args": {}}"#]));
        let err = agent(llm, 5).invoke(vec![]).await.unwrap_err();
        assert!(err.contains("Tool execution failed"));
        assert!(err.contains("drop_db"));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "sql_db_list_tables", "args": {}}"#,
            r#"{"tool": "sql_db_list_tables", "args": {}}"#,
        ]));
        let err = agent(llm, 2).invoke(vec![]).await.unwrap_err();
        assert!(err.contains("2 steps"));
    }

    #[tokio::test]
    async fn test_llm_error_passes_through() {
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()).then_fail("429 Resource exhausted"));
        let err = agent(llm, 3).invoke(vec![]).await.unwrap_err();
        assert_eq!(err, "429 Resource exhausted");
    }

    #[test]
    fn test_factory_rejects_empty_tools() {
        let factory = ReactAgentFactory {
            max_steps: 5,
            tool_timeout_secs: 5,
        };
        let err = factory
            .build(Arc::new(crate::llm::MockLlmClient), ToolRegistry::new(), "x")
            .err()
            .unwrap();
        assert!(err.contains("get_tools"));
    }
}
