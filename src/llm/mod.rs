//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）及按配置构建客户端的工厂

pub mod factory;
pub mod mock;
pub mod openai;
pub mod traits;

pub use factory::{ClientFactory, ConfiguredClientFactory};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;
