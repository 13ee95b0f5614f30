//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `INSIGHT__*` 覆盖（双下划线表示嵌套，如 `INSIGHT__LLM__MODEL=gemini-2.5-pro`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::Language;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub agent: AgentSection,
}

/// [llm] 段：后端、模型与采样参数
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai（OpenAI 兼容端点）/ mock（离线演示）
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI 兼容端点；写成空字符串表示使用 OpenAI 官方地址
    #[serde(default = "default_base_url", deserialize_with = "empty_as_none")]
    pub base_url: Option<String>,
    /// 越低越确定；SQL 生成更看重精确
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// 启动时从该环境变量读取初始 API Key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_base_url() -> Option<String> {
    Some("https://generativelanguage.googleapis.com/v1beta/openai".to_string())
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

fn default_temperature() -> f32 {
    0.3
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

/// [database] 段：数据源 URI 与查询结果限制
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_uri")]
    pub uri: String,
    /// sql_db_schema 每张表附带的示例行数
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
    /// sql_db_query 最多返回的行数
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            sample_rows: default_sample_rows(),
            max_rows: default_max_rows(),
        }
    }
}

fn default_uri() -> String {
    "sqlite:///dresses.db".to_string()
}

fn default_sample_rows() -> usize {
    3
}

fn default_max_rows() -> usize {
    100
}

/// [agent] 段：语言、终答标记、轨迹展示与 ReAct 限制
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default)]
    pub language: Language,
    #[serde(default = "default_final_marker")]
    pub final_marker: String,
    /// 轨迹中 Observation 的展示长度（字符）
    #[serde(default = "default_observation_display_chars")]
    pub observation_display_chars: usize,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 系统指令模板文件（支持 {language} / {final_marker} 占位符）
    pub instructions_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            language: Language::default(),
            final_marker: default_final_marker(),
            observation_display_chars: default_observation_display_chars(),
            max_steps: default_max_steps(),
            tool_timeout_secs: default_tool_timeout_secs(),
            instructions_path: None,
        }
    }
}

fn default_final_marker() -> String {
    "Final Answer:".to_string()
}

fn default_observation_display_chars() -> usize {
    1000
}

fn default_max_steps() -> usize {
    25
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// 从 config 目录加载配置，环境变量 INSIGHT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 INSIGHT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignoring", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("INSIGHT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载失败时记录警告并回退默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.database.uri, "sqlite:///dresses.db");
        assert_eq!(cfg.agent.language, Language::English);
        assert_eq!(cfg.agent.final_marker, "Final Answer:");
        assert_eq!(cfg.agent.observation_display_chars, 1000);
    }

    #[test]
    fn test_load_from_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[database]\nuri = \"sqlite:///other.db\"\n\n[agent]\nlanguage = \"Indonesian\"\nmax_steps = 8\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.database.uri, "sqlite:///other.db");
        assert_eq!(cfg.database.sample_rows, 3);
        assert_eq!(cfg.agent.language, Language::Indonesian);
        assert_eq!(cfg.agent.max_steps, 8);
        assert_eq!(cfg.llm.temperature, 0.3);
        assert!(cfg.llm.base_url.is_some());
    }

    #[test]
    fn test_empty_base_url_means_default_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openai.toml");
        std::fs::write(&path, "[llm]\nmodel = \"gpt-4o-mini\"\nbase_url = \"\"\n").unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.llm.base_url, None);
    }
}
