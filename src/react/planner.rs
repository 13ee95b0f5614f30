//! LLM 输出解析：Tool Call 或直接回复
//!
//! 工具调用使用简化 JSON：{"tool": "sql_db_query", "args": {"query": "..."}}，可包在 ```json 代码块中，
//! 代码块/JSON 之前的文字视为思考内容。不含 "tool" 键的文本一律视为回复。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;

/// LLM 返回的 Tool Call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// 解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 直接回复用户
    Response(String),
    /// 需要执行工具；thought 为 JSON 之前的说明文字
    ToolCall {
        call: ParsedToolCall,
        thought: Option<String>,
    },
}

/// 解析 LLM 输出：若含有效 JSON 且 tool 非空则为 ToolCall，否则为 Response
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    let (preamble, json_str) = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        (&trimmed[..start], body.trim())
    } else if let Some(start) = trimmed.find('{') {
        (&trimmed[..start], &trimmed[start..])
    } else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    // 只取第一个 JSON 值，其后的文字（可能含花括号或第二个调用）忽略；
    // 只有明显是工具调用的 JSON 解析失败才算错误，回答正文里偶然出现的花括号不算
    let first = serde_json::Deserializer::from_str(json_str)
        .into_iter::<ParsedToolCall>()
        .next();
    let mut parsed = match first {
        Some(Ok(p)) => p,
        Some(Err(e)) if json_str.contains("\"tool\"") => {
            return Err(AgentError::JsonParseError(format!("{}: {}", e, json_str)));
        }
        _ => return Ok(PlannerOutput::Response(trimmed.to_string())),
    };

    if parsed.tool.trim().is_empty() {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    }
    if parsed.args.is_null() {
        parsed.args = Value::Object(Default::default());
    }

    let thought = preamble.trim();
    Ok(PlannerOutput::ToolCall {
        call: parsed,
        thought: (!thought.is_empty()).then(|| thought.to_string()),
    })
}
