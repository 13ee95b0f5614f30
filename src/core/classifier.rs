//! 错误分类器
//!
//! 上游（模型客户端、SQLite 驱动、推理引擎）抛出的错误都是无类型文本；这里按阶段维护有序规则表，
//! 大小写不敏感的关键词匹配，首条命中即返回，未命中落到该阶段的 Unknown 类别并保留原文。
//! 规则表是尽力而为的，不保证穷尽。

use std::fmt;

use serde::Serialize;

/// 出错的阶段：决定使用哪张规则表
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ClientInit,
    ToolkitConnect,
    AgentBuild,
    Invocation,
}

/// 封闭的错误类别集合，每个类别对应一条固定的用户提示
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    // 模型客户端构建
    AuthError,
    ModelAccessError,
    ConnectionError,
    UnknownInitError,
    // 数据源连接
    MalformedUriError,
    DataSourceUnreachableError,
    UnknownConnectError,
    // Agent 构建
    ToolkitConfigError,
    ModelBindingError,
    FrameworkVersionError,
    AuthOrQuotaError,
    UnknownBuildError,
    // 单轮调用
    QuotaExceeded,
    AuthRejected,
    OutputParsingError,
    ToolExecutionError,
    UnknownRuntimeError,
}

impl ErrorCategory {
    pub fn is_unknown(self) -> bool {
        matches!(
            self,
            Self::UnknownInitError
                | Self::UnknownConnectError
                | Self::UnknownBuildError
                | Self::UnknownRuntimeError
        )
    }

    /// 类别对应的固定提示文本
    pub fn remediation(self) -> &'static str {
        match self {
            Self::AuthError => {
                "Authentication failed: the provided API key is invalid. Please check it and set it again."
            }
            Self::ModelAccessError => {
                "Model access error: the configured model could not be reached. Your API key might not support this model version yet."
            }
            Self::ConnectionError => {
                "Connection error: unable to reach the model provider. Please check your internet connection."
            }
            Self::UnknownInitError => "Initialization error while creating the model client.",
            Self::MalformedUriError => {
                "Invalid database URI. Please check the connection string format in the configuration."
            }
            Self::DataSourceUnreachableError => {
                "Operational error: the database could not be opened. Is the database file in the expected location?"
            }
            Self::UnknownConnectError => "Connection to the database failed.",
            Self::ToolkitConfigError => {
                "Toolkit configuration error: the necessary tools could not be extracted from the database connection. Please verify the database path and permissions."
            }
            Self::ModelBindingError => {
                "AI model error: the language model was not initialized correctly. Please check your API key and model selection."
            }
            Self::FrameworkVersionError => {
                "Library version error: the agent framework rejected the build parameters. Please update your dependencies."
            }
            Self::AuthOrQuotaError => {
                "API access error: access to the model API was denied. Check your API key or quota limits."
            }
            Self::UnknownBuildError => "An unexpected error occurred while building the agent.",
            Self::QuotaExceeded => {
                "API quota exceeded. Please wait a moment or check your provider plan."
            }
            Self::AuthRejected => "Invalid API key. Please check your API key and set it again.",
            Self::OutputParsingError => {
                "Parsing error: the model response could not be interpreted. Please try again."
            }
            Self::ToolExecutionError => {
                "Database error: the generated SQL query failed to execute. You can rephrase the question and try again."
            }
            Self::UnknownRuntimeError => "An error occurred while answering.",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 分类结果：类别 + 原始错误文本
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub stage: Stage,
    pub category: ErrorCategory,
    pub raw: String,
}

impl ClassifiedError {
    /// 面向用户的提示；Unknown 类别附带原始错误原文，便于诊断
    pub fn user_message(&self) -> String {
        if self.category.is_unknown() {
            format!("{}\n\nTechnical details: {}", self.category.remediation(), self.raw)
        } else {
            self.category.remediation().to_string()
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.raw)
    }
}

impl std::error::Error for ClassifiedError {}

/// 一条规则：任一关键词出现即命中
#[derive(Clone, Debug)]
pub struct Rule {
    keywords: Vec<String>,
    category: ErrorCategory,
}

impl Rule {
    pub fn new(keywords: &[&str], category: ErrorCategory) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            category,
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

/// 某一阶段的有序规则表 + 兜底类别
#[derive(Clone, Debug)]
pub struct RuleTable {
    rules: Vec<Rule>,
    fallback: ErrorCategory,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>, fallback: ErrorCategory) -> Self {
        Self { rules, fallback }
    }

    pub fn classify(&self, raw: &str) -> ErrorCategory {
        let lowered = raw.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.matches(&lowered))
            .map(|r| r.category)
            .unwrap_or(self.fallback)
    }
}

/// 按阶段分派的错误分类器
#[derive(Clone, Debug)]
pub struct ErrorClassifier {
    client_init: RuleTable,
    toolkit_connect: RuleTable,
    agent_build: RuleTable,
    invocation: RuleTable,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        use ErrorCategory::*;
        Self {
            client_init: RuleTable::new(
                vec![
                    Rule::new(&["api_key", "403", "key not found", "invalid api key"], AuthError),
                    Rule::new(&["not found", "404", "models/"], ModelAccessError),
                    Rule::new(&["transport", "connection", "socket"], ConnectionError),
                ],
                UnknownInitError,
            ),
            toolkit_connect: RuleTable::new(
                vec![
                    Rule::new(
                        &["argumenterror", "invalid database uri", "unsupported scheme"],
                        MalformedUriError,
                    ),
                    Rule::new(
                        &["operationalerror", "unable to open", "no such file", "not a database"],
                        DataSourceUnreachableError,
                    ),
                ],
                UnknownConnectError,
            ),
            agent_build: RuleTable::new(
                vec![
                    Rule::new(&["toolkit", "argument", "get_tools"], ToolkitConfigError),
                    Rule::new(&["model", "llm", "callable"], ModelBindingError),
                    Rule::new(
                        &["unexpected keyword argument", "state_modifier", "unsupported version"],
                        FrameworkVersionError,
                    ),
                    Rule::new(&["429", "quota", "api_key"], AuthOrQuotaError),
                ],
                UnknownBuildError,
            ),
            invocation: RuleTable::new(
                vec![
                    Rule::new(&["429", "resource", "rate limit"], QuotaExceeded),
                    Rule::new(&["api_key", "400", "unauthorized", "401"], AuthRejected),
                    Rule::new(&["parsing", "outputparser"], OutputParsingError),
                    Rule::new(&["operationalerror", "tool execution failed"], ToolExecutionError),
                ],
                UnknownRuntimeError,
            ),
        }
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, stage: Stage) -> &RuleTable {
        match stage {
            Stage::ClientInit => &self.client_init,
            Stage::ToolkitConnect => &self.toolkit_connect,
            Stage::AgentBuild => &self.agent_build,
            Stage::Invocation => &self.invocation,
        }
    }

    /// 在某阶段规则表最前面插入一条规则（优先级最高）
    pub fn with_rule(mut self, stage: Stage, rule: Rule) -> Self {
        let table = match stage {
            Stage::ClientInit => &mut self.client_init,
            Stage::ToolkitConnect => &mut self.toolkit_connect,
            Stage::AgentBuild => &mut self.agent_build,
            Stage::Invocation => &mut self.invocation,
        };
        table.rules.insert(0, rule);
        self
    }

    pub fn classify(&self, stage: Stage, raw: impl Into<String>) -> ClassifiedError {
        let raw = raw.into();
        let category = self.table(stage).classify(&raw);
        ClassifiedError {
            stage,
            category,
            raw,
        }
    }
}
