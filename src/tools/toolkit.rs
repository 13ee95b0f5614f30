//! SQL Toolkit：一个只读数据库 + 绑定模型客户端的工具集合

use std::fmt;
use std::sync::Arc;

use crate::config::DatabaseSection;
use crate::llm::LlmClient;
use crate::tools::{
    ListTablesTool, QueryCheckerTool, QueryTool, SchemaTool, SqlDatabase, ToolRegistry,
};

/// 绑定到同一数据库的 SQL 工具集
pub struct SqlToolkit {
    database: Arc<SqlDatabase>,
    registry: ToolRegistry,
}

impl SqlToolkit {
    pub fn new(database: SqlDatabase, client: Arc<dyn LlmClient>) -> Self {
        let database = Arc::new(database);
        let mut registry = ToolRegistry::new();
        registry.register(ListTablesTool::new(database.clone()));
        registry.register(SchemaTool::new(database.clone()));
        registry.register(QueryTool::new(database.clone()));
        registry.register(QueryCheckerTool::new(client, database.dialect()));
        Self { database, registry }
    }

    pub fn dialect(&self) -> &'static str {
        self.database.dialect()
    }

    /// 取出工具集；为空视为 Toolkit 配置错误
    pub fn get_tools(&self) -> Result<ToolRegistry, String> {
        if self.registry.is_empty() {
            return Err("toolkit exposes no tools (get_tools returned nothing)".to_string());
        }
        Ok(self.registry.clone())
    }

    #[cfg(test)]
    pub(crate) fn in_memory_for_tests() -> Self {
        let conn = rusqlite::Connection::open_in_memory().expect("in-memory sqlite");
        Self::new(
            SqlDatabase::from_connection(conn, 3, 100),
            Arc::new(crate::llm::MockLlmClient),
        )
    }
}

impl fmt::Debug for SqlToolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlToolkit")
            .field("dialect", &self.dialect())
            .field("tools", &self.registry.tool_names())
            .finish()
    }
}

/// 数据源连接工厂：连接 URI 并与模型客户端绑定
pub trait ToolkitFactory: Send + Sync {
    fn connect(
        &self,
        client: Arc<dyn LlmClient>,
        database: &DatabaseSection,
    ) -> Result<SqlToolkit, String>;
}

/// 默认实现：只读打开 SQLite
#[derive(Debug, Default)]
pub struct SqliteToolkitFactory;

impl ToolkitFactory for SqliteToolkitFactory {
    fn connect(
        &self,
        client: Arc<dyn LlmClient>,
        database: &DatabaseSection,
    ) -> Result<SqlToolkit, String> {
        let db = SqlDatabase::open(&database.uri, database.sample_rows, database.max_rows)?;
        Ok(SqlToolkit::new(db, client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolkit_exposes_four_tools() {
        let toolkit = SqlToolkit::in_memory_for_tests();
        let tools = toolkit.get_tools().unwrap();
        assert_eq!(
            tools.tool_names(),
            vec![
                "sql_db_list_tables",
                "sql_db_query",
                "sql_db_query_checker",
                "sql_db_schema"
            ]
        );
    }

    #[test]
    fn test_factory_rejects_malformed_uri() {
        let section = DatabaseSection {
            uri: "mysql://root@localhost/db".to_string(),
            ..DatabaseSection::default()
        };
        let err = SqliteToolkitFactory
            .connect(Arc::new(crate::llm::MockLlmClient), &section)
            .unwrap_err();
        assert!(err.contains("unsupported scheme"));
    }
}
