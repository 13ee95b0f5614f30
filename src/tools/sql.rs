//! 只读 SQLite 数据源
//!
//! URI 形如 `sqlite:///relative.db`、`sqlite:////abs/path.db`、`sqlite:///:memory:`；
//! 文件库以 SQLITE_OPEN_READ_ONLY 打开，查询前再用 `Statement::readonly` 拒绝写语句。

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle, OpenFlags};
use serde_json::Value;

const SQLITE_PREFIX: &str = "sqlite://";

/// 解析后的数据源位置
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataSource {
    File(PathBuf),
    Memory,
}

/// 解析数据源 URI；错误文本含 "invalid database uri" / "unsupported scheme" 供分类器识别
pub fn parse_database_uri(uri: &str) -> Result<DataSource, String> {
    let uri = uri.trim();
    let Some(rest) = uri.strip_prefix(SQLITE_PREFIX) else {
        return match uri.split_once("://") {
            Some((scheme, _)) if !scheme.is_empty() => Err(format!(
                "unsupported scheme '{scheme}' in database uri (only sqlite is supported)"
            )),
            _ => Err(format!(
                "invalid database uri '{uri}': expected sqlite:///<path>"
            )),
        };
    };

    if rest.is_empty() {
        return Ok(DataSource::Memory);
    }
    // sqlite:// 之后必须紧跟 '/'，不支持 host
    let Some(path) = rest.strip_prefix('/') else {
        return Err(format!(
            "invalid database uri '{uri}': sqlite uris take no host, use sqlite:///<path>"
        ));
    };
    match path {
        "" | ":memory:" => Ok(DataSource::Memory),
        p => Ok(DataSource::File(PathBuf::from(p))),
    }
}

/// 只读数据库句柄（rusqlite Connection 非 Sync，外包 Mutex）
pub struct SqlDatabase {
    conn: Mutex<Connection>,
    interrupt: InterruptHandle,
    sample_rows: usize,
    max_rows: usize,
}

impl SqlDatabase {
    /// 打开 URI 指向的数据库并做一次探测查询
    pub fn open(uri: &str, sample_rows: usize, max_rows: usize) -> Result<Self, String> {
        let conn = match parse_database_uri(uri)? {
            DataSource::Memory => Connection::open_in_memory().map_err(|e| e.to_string())?,
            DataSource::File(path) => {
                if !path.exists() {
                    return Err(format!(
                        "unable to open database file '{}': no such file",
                        path.display()
                    ));
                }
                Connection::open_with_flags(
                    &path,
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(|e| format!("unable to open database file '{}': {e}", path.display()))?
            }
        };

        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| e.to_string())?;

        tracing::info!(uri, "database opened read-only");
        Ok(Self::from_connection(conn, sample_rows, max_rows))
    }

    /// 包装已有连接（测试或内存库）
    pub fn from_connection(conn: Connection, sample_rows: usize, max_rows: usize) -> Self {
        let interrupt = conn.get_interrupt_handle();
        Self {
            conn: Mutex::new(conn),
            interrupt,
            sample_rows,
            max_rows,
        }
    }

    /// 在阻塞线程池上执行数据库操作，不占用异步运行时线程。
    /// 返回的 future 在完成前被丢弃（例如工具超时）时，中断正在执行的语句并释放连接。
    pub async fn blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&SqlDatabase) -> Result<T, String> + Send + 'static,
    {
        let mut guard = InterruptOnDrop {
            db: self.clone(),
            armed: true,
        };
        let db = self.clone();
        let result = tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| format!("database task failed: {e}"));
        guard.armed = false;
        result?
    }

    pub fn dialect(&self) -> &'static str {
        "sqlite"
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, String> {
        self.conn
            .lock()
            .map_err(|_| "database connection lock poisoned".to_string())
    }

    /// 用户表与视图名（按名称排序，排除 sqlite_ 内部表）
    pub fn usable_table_names(&self) -> Result<Vec<String>, String> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )
            .map_err(|e| e.to_string())?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| e.to_string())?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        Ok(names)
    }

    /// 指定表的 CREATE 语句与若干示例行；存在未知表时整体报错
    pub fn table_info(&self, tables: &[String]) -> Result<String, String> {
        let known = self.usable_table_names()?;
        let missing: Vec<&String> = tables.iter().filter(|t| !known.contains(t)).collect();
        if !missing.is_empty() {
            return Err(format!("table_names {missing:?} not found in database"));
        }

        let conn = self.lock()?;
        let mut sections = Vec::with_capacity(tables.len());
        for table in tables {
            let create: String = conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .map_err(|e| e.to_string())?;

            let mut section = create.trim().to_string();
            if self.sample_rows > 0 {
                let (columns, rows) = select_rows(
                    &conn,
                    &format!("SELECT * FROM {} LIMIT {}", quote_ident(table), self.sample_rows),
                    self.sample_rows,
                )?;
                section.push_str(&format!(
                    "\n\n/*\n{} rows from {} table:\n{}\n",
                    rows.len(),
                    table,
                    columns.join("\t")
                ));
                for row in rows {
                    let cells: Vec<String> = row.iter().map(display_cell).collect();
                    section.push_str(&cells.join("\t"));
                    section.push('\n');
                }
                section.push_str("*/");
            }
            sections.push(section);
        }
        Ok(sections.join("\n\n"))
    }

    /// 执行只读查询，结果为 JSON 行数组（最多 max_rows 行）
    pub fn run(&self, query: &str) -> Result<String, String> {
        let conn = self.lock()?;
        {
            let stmt = conn.prepare(query).map_err(|e| e.to_string())?;
            if !stmt.readonly() {
                return Err(
                    "only read-only statements are allowed (INSERT/UPDATE/DELETE/DDL are rejected)"
                        .to_string(),
                );
            }
        }
        let (_, rows) = select_rows(&conn, query, self.max_rows)?;
        serde_json::to_string(&rows).map_err(|e| e.to_string())
    }
}

struct InterruptOnDrop {
    db: Arc<SqlDatabase>,
    armed: bool,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("database operation abandoned, interrupting statement");
            self.db.interrupt.interrupt();
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn select_rows(
    conn: &Connection,
    sql: &str,
    limit: usize,
) -> Result<(Vec<String>, Vec<Vec<Value>>), String> {
    let mut stmt = conn.prepare(sql).map_err(|e| e.to_string())?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();
    let mut rows = stmt.query([]).map_err(|e| e.to_string())?;
    let mut out = Vec::new();
    while out.len() < limit {
        let Some(row) = rows.next().map_err(|e| e.to_string())? else {
            break;
        };
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            let v = row.get_ref(i).map_err(|e| e.to_string())?;
            values.push(to_json(v));
        }
        out.push(values);
    }
    Ok((columns, out))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

fn display_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
