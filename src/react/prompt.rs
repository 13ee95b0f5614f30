//! 系统指令：语言与终答标记在构建 Agent 时写入固定指令，不按调用传递

use std::path::Path;

use crate::core::Language;
use crate::tools::{tool_call_schema_json, ToolRegistry};

/// 内置指令模板；占位符 {language} / {final_marker}
pub const DEFAULT_INSTRUCTIONS: &str = r#"You are an expert Data Analyst and SQL Analyst.
Your goal is to answer user questions by querying a database.

RULES:
1. ALWAYS start by checking the list of tables ('sql_db_list_tables').
2. Then, check the schema of the relevant table ('sql_db_schema').
3. Construct a syntactically correct SQL query.
4. Execute the query using 'sql_db_query'.
5. If you get an error, check your query and try again.
6. DO NOT execute DML statements (INSERT, UPDATE, DELETE).

7. LANGUAGE OUTPUT RULE: When you have the answer, you MUST use the format: "{final_marker} [Your answer in {language}]".
   - The user's chosen output language is: "{language}".
   - Ignore the language the user writes in; the final answer MUST be in {language}.
   - Translate before giving the final answer. Do not mimic the user's language.
   - Provide context and reasoning in your answer, not just numbers.

8. CASUAL CHAT (NO TOOL USED):
   - Even without a tool (e.g. greetings), reply in {language} and still start with "{final_marker}".
"#;

/// 按顺序查找指令模板：显式路径 > config/prompts/system.md > 内置模板
pub fn load_instructions_template(path: Option<&Path>) -> String {
    let explicit = path.and_then(|p| match std::fs::read_to_string(p) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("Instructions template {} unreadable ({}), falling back", p.display(), e);
            None
        }
    });
    explicit
        .or_else(|| {
            ["config/prompts/system.md", "../config/prompts/system.md"]
                .into_iter()
                .find_map(|p| std::fs::read_to_string(p).ok())
        })
        .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string())
}

/// 把语言与终答标记写入模板
pub fn render_instructions(template: &str, language: Language, final_marker: &str) -> String {
    template
        .replace("{language}", language.as_str())
        .replace("{final_marker}", final_marker.trim())
}

/// 完整 system prompt：固定指令 + 工具清单与参数 schema + 工具调用格式
pub fn build_system_prompt(instructions: &str, tools: &ToolRegistry) -> String {
    format!(
        "{}\n\n## Available tools\n```json\n{}\n```\n\n## Tool call format\n\
         To call a tool, reply with ONLY one JSON object {{\"tool\": \"<name>\", \"args\": {{...}}}} \
         matching this schema (you may put a short thought before it):\n```json\n{}\n```\n\
         When you are done, reply with plain text (no JSON).",
        instructions.trim_end(),
        tools.to_schema_json(),
        tool_call_schema_json()
    )
}
