//! SQL 工具：列表、表结构、只读查询、查询自检
//!
//! 数据库层面的失败（表不存在、语法错误、写语句）以 "Error: ..." 文本作为 Observation 返回，
//! 让 Agent 自行修正查询；只有参数不合法才返回 Err。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::schema::args_schema;
use crate::tools::{SqlDatabase, Tool};

pub const LIST_TABLES: &str = "sql_db_list_tables";
pub const SCHEMA: &str = "sql_db_schema";
pub const QUERY: &str = "sql_db_query";
pub const QUERY_CHECKER: &str = "sql_db_query_checker";

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("invalid arguments for {tool}: {e}"))
}

/// sql_db_list_tables 的参数（无）
#[allow(dead_code)]
#[derive(Debug, Default, Deserialize, JsonSchema)]
struct ListTablesArgs {}

/// 列出所有用户表
pub struct ListTablesTool {
    db: Arc<SqlDatabase>,
}

impl ListTablesTool {
    pub fn new(db: Arc<SqlDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for ListTablesTool {
    fn name(&self) -> &str {
        LIST_TABLES
    }

    fn description(&self) -> &str {
        "Input is an empty object, output is a comma-separated list of tables in the database."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ListTablesArgs>()
    }

    async fn execute(&self, _args: Value) -> Result<String, String> {
        Ok(match self.db.blocking(|db| db.usable_table_names()).await {
            Ok(names) => names.join(", "),
            Err(e) => format!("Error: {e}"),
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SchemaArgs {
    /// 逗号分隔的表名，如 "table1, table2"
    table_names: String,
}

/// 查看表结构与示例行
pub struct SchemaTool {
    db: Arc<SqlDatabase>,
}

impl SchemaTool {
    pub fn new(db: Arc<SqlDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for SchemaTool {
    fn name(&self) -> &str {
        SCHEMA
    }

    fn description(&self) -> &str {
        "Input is a comma-separated list of tables, output is the schema and sample rows for those tables. \
         Be sure that the tables actually exist by calling sql_db_list_tables first! \
         Example input: {\"table_names\": \"table1, table2\"}"
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<SchemaArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: SchemaArgs = parse_args(SCHEMA, args)?;
        let tables: Vec<String> = args
            .table_names
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if tables.is_empty() {
            return Ok("Error: no table names given".to_string());
        }
        Ok(match self.db.blocking(move |db| db.table_info(&tables)).await {
            Ok(info) => info,
            Err(e) => format!("Error: {e}"),
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct QueryArgs {
    /// 一条完整、正确的只读 SQL 查询
    query: String,
}

/// 执行只读 SQL 查询
pub struct QueryTool {
    db: Arc<SqlDatabase>,
}

impl QueryTool {
    pub fn new(db: Arc<SqlDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for QueryTool {
    fn name(&self) -> &str {
        QUERY
    }

    fn description(&self) -> &str {
        "Input is a detailed and correct SQL query, output is a result from the database as JSON rows. \
         If the query is not correct, an error message will be returned. If an error is returned, \
         rewrite the query, check the query, and try again. If you encounter an unknown column, \
         use sql_db_schema to query the correct table fields."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<QueryArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: QueryArgs = parse_args(QUERY, args)?;
        tracing::debug!(query = %args.query, "running query");
        let query = args.query;
        Ok(match self.db.blocking(move |db| db.run(&query)).await {
            Ok(rows) => rows,
            Err(e) => format!("Error: {e}"),
        })
    }
}

const QUERY_CHECK_PROMPT: &str = "{query}
Double check the {dialect} query above for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.

Output the final SQL query only.";

/// 让绑定的模型复查 SQL 查询
pub struct QueryCheckerTool {
    llm: Arc<dyn LlmClient>,
    dialect: &'static str,
}

impl QueryCheckerTool {
    pub fn new(llm: Arc<dyn LlmClient>, dialect: &'static str) -> Self {
        Self { llm, dialect }
    }
}

#[async_trait]
impl Tool for QueryCheckerTool {
    fn name(&self) -> &str {
        QUERY_CHECKER
    }

    fn description(&self) -> &str {
        "Use this tool to double check if your query is correct before executing it. \
         Always use this tool before executing a query with sql_db_query!"
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<QueryArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: QueryArgs = parse_args(QUERY_CHECKER, args)?;
        let prompt = QUERY_CHECK_PROMPT
            .replace("{query}", &args.query)
            .replace("{dialect}", self.dialect);
        let checked = self.llm.complete(&[Message::user(prompt)]).await?;
        Ok(strip_sql_fence(&checked))
    }
}

/// 去掉模型可能包裹的 ```sql 代码块
fn strip_sql_fence(text: &str) -> String {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"));
    inner.unwrap_or(trimmed).trim().to_string()
}
