//! 按配置构建 LLM 客户端
//!
//! 生命周期管理器只通过 ClientFactory 创建客户端；失败以文本返回，由分类器映射到 ClientInit 阶段的类别。

use std::sync::Arc;

use crate::config::LlmSection;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};

/// 模型客户端工厂
pub trait ClientFactory: Send + Sync {
    fn create(&self, api_key: &str, llm: &LlmSection) -> Result<Arc<dyn LlmClient>, String>;
}

/// 根据 [llm].provider 选择后端（openai 兼容 / mock）
#[derive(Debug, Default)]
pub struct ConfiguredClientFactory;

impl ClientFactory for ConfiguredClientFactory {
    fn create(&self, api_key: &str, llm: &LlmSection) -> Result<Arc<dyn LlmClient>, String> {
        match llm.provider.to_lowercase().as_str() {
            "mock" => {
                tracing::warn!("Using Mock LLM (offline mode)");
                Ok(Arc::new(MockLlmClient))
            }
            "openai" => {
                if api_key.trim().is_empty() {
                    return Err("api_key must not be empty".to_string());
                }
                if llm.model.trim().is_empty() {
                    return Err("models/: model name not found in configuration".to_string());
                }
                if !(0.0..=2.0).contains(&llm.temperature) {
                    return Err(format!(
                        "temperature {} out of range [0, 2]",
                        llm.temperature
                    ));
                }
                tracing::info!("Using OpenAI-compatible LLM ({})", llm.model);
                Ok(Arc::new(OpenAiClient::new(
                    llm.base_url.as_deref(),
                    &llm.model,
                    api_key,
                    llm.temperature,
                )))
            }
            other => Err(format!("unsupported llm provider '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_requires_model() {
        let llm = LlmSection {
            model: String::new(),
            ..LlmSection::default()
        };
        let err = ConfiguredClientFactory.create("k", &llm).err().unwrap();
        assert!(err.contains("models/"));
    }

    #[test]
    fn test_mock_provider() {
        let llm = LlmSection {
            provider: "mock".to_string(),
            ..LlmSection::default()
        };
        assert!(ConfiguredClientFactory.create("", &llm).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let llm = LlmSection {
            provider: "carrier-pigeon".to_string(),
            ..LlmSection::default()
        };
        assert!(ConfiguredClientFactory.create("k", &llm).is_err());
    }
}
