//! 资源生命周期管理
//!
//! 按 模型客户端 → SQL Toolkit → Agent 的顺序构建资源，每个 ensure 操作都是幂等的：资源已存在直接返回。
//! 资源变化只经过 Resources 的纯迁移函数；构建失败按阶段交给分类器。
//! Agent 只对一种语言、一份指令有效，语言变化时丢弃重建，不做原地修改。

use std::fmt;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{
    ApiKey, BuiltAgent, ClassifiedError, ErrorClassifier, Language, LifecycleError, Session, Stage,
};
use crate::llm::{ClientFactory, ConfiguredClientFactory, LlmClient};
use crate::react::{load_instructions_template, render_instructions, AgentFactory, ReactAgentFactory};
use crate::tools::{SqlToolkit, SqliteToolkitFactory, ToolkitFactory};

/// connect 的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Toolkit 已存在，无需重新连接
    AlreadyActive,
    Connected,
}

/// 资源生命周期管理器：持有各阶段工厂与分类器，对传入的会话操作
pub struct ResourceManager {
    config: AppConfig,
    client_factory: Arc<dyn ClientFactory>,
    toolkit_factory: Arc<dyn ToolkitFactory>,
    agent_factory: Arc<dyn AgentFactory>,
    classifier: ErrorClassifier,
    instructions_template: String,
}

impl ResourceManager {
    /// 默认工厂：按配置选择 LLM 后端、只读 SQLite、ReactAgent
    pub fn new(config: AppConfig) -> Self {
        let instructions_template =
            load_instructions_template(config.agent.instructions_path.as_deref());
        let agent_factory = ReactAgentFactory {
            max_steps: config.agent.max_steps,
            tool_timeout_secs: config.agent.tool_timeout_secs,
        };
        Self {
            config,
            client_factory: Arc::new(ConfiguredClientFactory),
            toolkit_factory: Arc::new(SqliteToolkitFactory),
            agent_factory: Arc::new(agent_factory),
            classifier: ErrorClassifier::default(),
            instructions_template,
        }
    }

    pub fn with_client_factory(mut self, factory: impl ClientFactory + 'static) -> Self {
        self.client_factory = Arc::new(factory);
        self
    }

    pub fn with_toolkit_factory(mut self, factory: impl ToolkitFactory + 'static) -> Self {
        self.toolkit_factory = Arc::new(factory);
        self
    }

    pub fn with_agent_factory(mut self, factory: impl AgentFactory + 'static) -> Self {
        self.agent_factory = Arc::new(factory);
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_instructions_template(mut self, template: impl Into<String>) -> Self {
        self.instructions_template = template.into();
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    fn classify(&self, stage: Stage, raw: String) -> ClassifiedError {
        let err = self.classifier.classify(stage, raw);
        tracing::warn!(?stage, category = %err.category, raw = %err.raw, "resource build failed");
        err
    }

    /// 确保模型客户端存在；缺少 API Key 时阻塞
    pub fn ensure_client(&self, session: &mut Session) -> Result<Arc<dyn LlmClient>, LifecycleError> {
        if let Some(client) = session.resources.client() {
            return Ok(client.clone());
        }
        let key = session
            .api_key
            .as_ref()
            .filter(|k| !k.is_blank())
            .ok_or(LifecycleError::MissingApiKey)?;

        let client = self
            .client_factory
            .create(key.expose(), &self.config.llm)
            .map_err(|raw| self.classify(Stage::ClientInit, raw))?;

        session.resources = std::mem::take(&mut session.resources).with_client(client.clone());
        tracing::info!(session = %session.id(), model = %self.config.llm.model, "model client ready");
        Ok(client)
    }

    /// 确保 Toolkit 存在；需要客户端已就绪
    pub fn ensure_toolkit(&self, session: &mut Session) -> Result<Arc<SqlToolkit>, LifecycleError> {
        if let Some(toolkit) = session.resources.toolkit() {
            return Ok(toolkit.clone());
        }
        let client = session
            .resources
            .client()
            .cloned()
            .ok_or(LifecycleError::NotReady(session.state()))?;

        let toolkit = self
            .toolkit_factory
            .connect(client, &self.config.database)
            .map(Arc::new)
            .map_err(|raw| self.classify(Stage::ToolkitConnect, raw))?;

        session.resources = std::mem::take(&mut session.resources).with_toolkit(toolkit.clone());
        tracing::info!(session = %session.id(), uri = %self.config.database.uri, "database toolkit ready");
        Ok(toolkit)
    }

    /// 确保 Agent 存在；用会话当前语言渲染指令并绑定客户端与工具集
    pub fn ensure_agent(&self, session: &mut Session) -> Result<BuiltAgent, LifecycleError> {
        if let Some(agent) = session.resources.agent() {
            return Ok(agent.clone());
        }
        let (client, toolkit) = match (session.resources.client(), session.resources.toolkit()) {
            (Some(c), Some(t)) => (c.clone(), t.clone()),
            _ => return Err(LifecycleError::NotReady(session.state())),
        };

        let tools = toolkit
            .get_tools()
            .map_err(|raw| self.classify(Stage::AgentBuild, raw))?;
        let language = session.language;
        let instructions =
            render_instructions(&self.instructions_template, language, &self.config.agent.final_marker);

        let agent = self
            .agent_factory
            .build(client, tools, &instructions)
            .map_err(|raw| self.classify(Stage::AgentBuild, raw))?;
        let built = BuiltAgent::new(agent, language, instructions);

        session.resources = std::mem::take(&mut session.resources).with_agent(built.clone());
        tracing::info!(session = %session.id(), agent = %built.id, %language, "agent ready");
        Ok(built)
    }

    /// UI 的连接动作：依次确保客户端、Toolkit、Agent
    pub fn connect(&self, session: &mut Session) -> Result<ConnectOutcome, LifecycleError> {
        let already = session.resources.toolkit().is_some();
        self.ensure_client(session)?;
        self.ensure_toolkit(session)?;
        self.ensure_agent(session)?;
        Ok(if already {
            ConnectOutcome::AlreadyActive
        } else {
            ConnectOutcome::Connected
        })
    }

    /// 只清空历史；仅当 Agent 的语言与会话语言不一致时丢弃 Agent
    pub fn reset_soft(&self, session: &mut Session) {
        session.history.clear();
        let stale = session
            .resources
            .agent()
            .is_some_and(|a| a.language != session.language);
        if stale {
            session.resources = std::mem::take(&mut session.resources).without_agent();
        }
        tracing::info!(session = %session.id(), dropped_agent = stale, "chat history cleared");
    }

    /// 回到 Uninitialized 并清空历史；API Key 与语言偏好保留
    pub fn reset_full(&self, session: &mut Session) {
        session.history.clear();
        session.resources = Default::default();
        tracing::info!(session = %session.id(), "session fully reset");
    }

    /// 切换语言并使 Agent 失效；客户端、Toolkit 与历史保留。返回是否发生了变化
    pub fn on_language_changed(&self, session: &mut Session, language: Language) -> bool {
        if session.language == language {
            return false;
        }
        session.language = language;
        session.resources = std::mem::take(&mut session.resources).without_agent();
        tracing::info!(session = %session.id(), %language, state = ?session.state(), "language changed");
        true
    }

    /// 更换 API Key：客户端绑定在 Key 上，Toolkit 与 Agent 又绑定在客户端上，因此全部丢弃；历史保留
    pub fn on_api_key_changed(&self, session: &mut Session, key: ApiKey) -> bool {
        let key = (!key.is_blank()).then_some(key);
        if session.api_key == key {
            return false;
        }
        session.api_key = key;
        session.resources = Default::default();
        tracing::info!(
            session = %session.id(),
            has_key = session.api_key.is_some(),
            "api key changed, resources dropped"
        );
        true
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseSection;
    use crate::core::{ErrorCategory, ResourceState};
    use crate::react::ReasoningAgent;
    use crate::tools::ToolRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录 connect 次数的 SQLite 工厂
    struct CountingToolkitFactory(Arc<AtomicUsize>);

    impl ToolkitFactory for CountingToolkitFactory {
        fn connect(
            &self,
            client: Arc<dyn LlmClient>,
            database: &DatabaseSection,
        ) -> Result<SqlToolkit, String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            SqliteToolkitFactory.connect(client, database)
        }
    }

    struct FailingClientFactory(&'static str);

    impl ClientFactory for FailingClientFactory {
        fn create(&self, _: &str, _: &crate::config::LlmSection) -> Result<Arc<dyn LlmClient>, String> {
            Err(self.0.to_string())
        }
    }

    struct FailingAgentFactory(&'static str);

    impl AgentFactory for FailingAgentFactory {
        fn build(
            &self,
            _: Arc<dyn LlmClient>,
            _: ToolRegistry,
            _: &str,
        ) -> Result<Arc<dyn ReasoningAgent>, String> {
            Err(self.0.to_string())
        }
    }

    fn config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg.database = DatabaseSection {
            uri: "sqlite:///:memory:".to_string(),
            ..DatabaseSection::default()
        };
        cfg
    }

    fn manager() -> ResourceManager {
        ResourceManager::new(config()).with_instructions_template("Answer in {language}. {final_marker}")
    }

    fn keyed_session() -> Session {
        let mut session = Session::default();
        session.api_key = Some(ApiKey::new("test-key"));
        session
    }

    #[test]
    fn test_missing_api_key() {
        let mut session = Session::default();
        let err = manager().ensure_client(&mut session).err().unwrap();
        assert_eq!(err, LifecycleError::MissingApiKey);
        assert_eq!(session.state(), ResourceState::Uninitialized);
    }

    #[test]
    fn test_ensure_client_is_idempotent() {
        let manager = manager();
        let mut session = keyed_session();
        let a = manager.ensure_client(&mut session).unwrap();
        let b = manager.ensure_client(&mut session).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(session.state(), ResourceState::ClientReady);
    }

    #[test]
    fn test_ensure_toolkit_is_idempotent() {
        let connects = Arc::new(AtomicUsize::new(0));
        let manager = manager().with_toolkit_factory(CountingToolkitFactory(connects.clone()));
        let mut session = keyed_session();
        manager.ensure_client(&mut session).unwrap();

        let a = manager.ensure_toolkit(&mut session).unwrap();
        let b = manager.ensure_toolkit(&mut session).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), ResourceState::ToolkitReady);

        // connect 在 Toolkit 已存在时也不再重新连接
        manager.connect(&mut session).unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_toolkit_requires_client() {
        let mut session = keyed_session();
        let err = manager().ensure_toolkit(&mut session).unwrap_err();
        assert_eq!(err, LifecycleError::NotReady(ResourceState::Uninitialized));
    }

    #[test]
    fn test_connect_reaches_agent_ready() {
        let manager = manager();
        let mut session = keyed_session();
        assert_eq!(manager.connect(&mut session).unwrap(), ConnectOutcome::Connected);
        assert_eq!(session.state(), ResourceState::AgentReady);
        let first = session.resources().agent().unwrap().id;

        assert_eq!(manager.connect(&mut session).unwrap(), ConnectOutcome::AlreadyActive);
        assert_eq!(session.resources().agent().unwrap().id, first);
    }

    #[test]
    fn test_agent_instructions_use_session_language() {
        let manager = manager();
        let mut session = keyed_session();
        manager.on_language_changed(&mut session, Language::Indonesian);
        manager.connect(&mut session).unwrap();
        let agent = session.resources().agent().unwrap();
        assert_eq!(agent.language, Language::Indonesian);
        assert_eq!(agent.instructions, "Answer in Indonesian. Final Answer:");
    }

    #[test]
    fn test_language_change_invalidates_agent_only() {
        let manager = manager();
        let mut session = keyed_session();
        manager.connect(&mut session).unwrap();
        let client = session.resources().client().unwrap().clone();
        let old_id = session.resources().agent().unwrap().id;

        assert!(manager.on_language_changed(&mut session, Language::Indonesian));
        assert_eq!(session.state(), ResourceState::ToolkitReady);
        assert!(Arc::ptr_eq(session.resources().client().unwrap(), &client));

        let rebuilt = manager.ensure_agent(&mut session).unwrap();
        assert_ne!(rebuilt.id, old_id);
        assert_eq!(rebuilt.language, Language::Indonesian);

        assert!(!manager.on_language_changed(&mut session, Language::Indonesian));
        assert_eq!(session.state(), ResourceState::AgentReady);
    }

    #[test]
    fn test_reset_soft_keeps_resources() {
        let manager = manager();
        let mut session = keyed_session();
        manager.connect(&mut session).unwrap();
        session.history.append(crate::memory::Turn::user("hi"));

        manager.reset_soft(&mut session);
        assert!(session.history().is_empty());
        assert_eq!(session.state(), ResourceState::AgentReady);
    }

    #[test]
    fn test_reset_soft_drops_agent_with_stale_language() {
        let manager = manager();
        let mut session = keyed_session();
        manager.connect(&mut session).unwrap();
        // 绕过 on_language_changed，模拟语言与 Agent 不一致
        session.language = Language::Indonesian;
        manager.reset_soft(&mut session);
        assert_eq!(session.state(), ResourceState::ToolkitReady);
    }

    #[test]
    fn test_reset_full_keeps_key_and_language() {
        let manager = manager();
        let mut session = keyed_session();
        manager.on_language_changed(&mut session, Language::Indonesian);
        manager.connect(&mut session).unwrap();
        session.history.append(crate::memory::Turn::user("hi"));

        manager.reset_full(&mut session);
        assert_eq!(session.state(), ResourceState::Uninitialized);
        assert!(session.history().is_empty());
        assert!(session.api_key().is_some());
        assert_eq!(session.language(), Language::Indonesian);
    }

    #[test]
    fn test_api_key_change_drops_resources_keeps_history() {
        let manager = manager();
        let mut session = keyed_session();
        manager.connect(&mut session).unwrap();
        session.history.append(crate::memory::Turn::user("hi"));

        assert!(!manager.on_api_key_changed(&mut session, ApiKey::new("test-key")));
        assert_eq!(session.state(), ResourceState::AgentReady);

        assert!(manager.on_api_key_changed(&mut session, ApiKey::new("other-key")));
        assert_eq!(session.state(), ResourceState::Uninitialized);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_client_failure_is_classified() {
        let manager = manager().with_client_factory(FailingClientFactory("API_KEY_INVALID"));
        let mut session = keyed_session();
        match manager.ensure_client(&mut session) {
            Err(LifecycleError::Classified(e)) => {
                assert_eq!(e.stage, Stage::ClientInit);
                assert_eq!(e.category, ErrorCategory::AuthError);
            }
            other => panic!("expected classified error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(session.state(), ResourceState::Uninitialized);
    }

    #[test]
    fn test_missing_database_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.database.uri = format!("sqlite:///{}", dir.path().join("nope.db").display());
        let manager = ResourceManager::new(cfg);
        let mut session = keyed_session();
        manager.ensure_client(&mut session).unwrap();

        match manager.ensure_toolkit(&mut session) {
            Err(LifecycleError::Classified(e)) => {
                assert_eq!(e.category, ErrorCategory::DataSourceUnreachableError)
            }
            other => panic!("expected classified error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(session.state(), ResourceState::ClientReady);
    }

    #[test]
    fn test_agent_build_failure_is_classified() {
        let manager = manager().with_agent_factory(FailingAgentFactory(
            "create_react_agent rejected state_modifier",
        ));
        let mut session = keyed_session();
        match manager.connect(&mut session) {
            Err(LifecycleError::Classified(e)) => {
                assert_eq!(e.stage, Stage::AgentBuild);
                assert_eq!(e.category, ErrorCategory::FrameworkVersionError);
            }
            other => panic!("expected classified error, got {other:?}"),
        }
        assert_eq!(session.state(), ResourceState::ToolkitReady);
    }

    #[test]
    fn test_ensure_agent_not_ready_without_toolkit() {
        let manager = manager();
        let mut session = keyed_session();
        manager.ensure_client(&mut session).unwrap();
        let err = manager.ensure_agent(&mut session).unwrap_err();
        assert_eq!(err, LifecycleError::NotReady(ResourceState::ClientReady));
    }
}
