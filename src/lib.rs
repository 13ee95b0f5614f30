//! InsightSQL - 用自然语言查询只读数据库的 ReAct 智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话与资源阶梯、生命周期管理、错误分类、命令编排
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 对话历史与 Agent 原生消息
//! - **observability**: 日志初始化
//! - **react**: ReAct Agent、输出解析、系统指令、推理轨迹提取
//! - **tools**: SQL 数据源、SQL 工具集与执行器

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
