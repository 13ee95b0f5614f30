//! 工具层：注册表、执行器、SQL 数据源与 SQL Toolkit

pub mod executor;
pub mod registry;
pub mod schema;
pub mod sql;
pub mod sql_tools;
pub mod toolkit;

pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};
pub use schema::tool_call_schema_json;
pub use sql::{parse_database_uri, DataSource, SqlDatabase};
pub use sql_tools::{ListTablesTool, QueryCheckerTool, QueryTool, SchemaTool};
pub use toolkit::{SqlToolkit, SqliteToolkitFactory, ToolkitFactory};
