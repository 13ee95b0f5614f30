//! 编排器：把前端命令落到会话上
//!
//! 一次交互处理完才接受下一次。提问时先检查就绪守卫，必要时惰性重建 Agent，
//! 用「历史 + 本轮提问」调用 Agent；成功后才把提问与回答追加进历史，失败时历史保持不变。

use crate::core::{
    not_ready_message, ApiKey, ConnectOutcome, Language, LifecycleError, ResourceManager,
    ResourceState, Session, SessionSnapshot, TurnError,
};
use crate::memory::Turn;
use crate::react::{TraceExtractor, TraceOptions, TurnOutput};

/// 前端发往编排器的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 提交问题
    Submit(String),
    SetApiKey(String),
    SetLanguage(Language),
    Connect,
    /// 只清空对话
    ClearChat,
    /// 清空对话并释放全部资源
    ResetAll,
    Status,
    Help,
    Quit,
}

impl Command {
    /// 解析 REPL 输入行；空行返回 None，以 / 开头的是命令，其余为提问
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Command::Submit(line.to_string())));
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((n, a)) => (n, a.trim()),
            None => (rest, ""),
        };
        let cmd = match name.to_lowercase().as_str() {
            "key" if arg.is_empty() => return Err("usage: /key <api key>".to_string()),
            "key" => Command::SetApiKey(arg.to_string()),
            "lang" | "language" => Command::SetLanguage(arg.parse()?),
            "connect" => Command::Connect,
            "clear" => Command::ClearChat,
            "reset" => Command::ResetAll,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command '/{other}', try /help")),
        };
        Ok(Some(cmd))
    }
}

/// 命令处理结果，由前端负责渲染
#[derive(Debug, Clone)]
pub enum Reply {
    Answer(TurnOutput),
    /// 普通提示
    Notice(String),
    /// 守卫提示：前置条件不满足
    Warning(String),
    /// 已分类的错误及其处理建议
    Error(String),
    Status(SessionSnapshot),
    Help,
    Quit,
}

pub const HELP_TEXT: &str = "\
Commands:
  /key <value>                 set the model API key
  /lang <English|Indonesian>   set the answer language
  /connect                     connect to the database and build the agent
  /clear                       clear the conversation
  /reset                       clear the conversation and release all resources
  /status                      show session status
  /help                        show this help
  /quit                        exit
Anything else is sent to the agent as a question.";

/// 编排器：生命周期管理 + 轨迹提取
#[derive(Debug)]
pub struct Orchestrator {
    manager: ResourceManager,
    extractor: TraceExtractor,
}

impl Orchestrator {
    pub fn new(manager: ResourceManager) -> Self {
        let extractor = TraceExtractor::new(
            TraceOptions::from(&manager.config().agent),
            manager.classifier().clone(),
        );
        Self { manager, extractor }
    }

    pub fn manager(&self) -> &ResourceManager {
        &self.manager
    }

    /// 按配置创建会话（初始语言取自 [agent].language）
    pub fn new_session(&self) -> Session {
        Session::new(self.manager.config().agent.language)
    }

    /// 回答一个问题
    pub async fn submit(&self, session: &mut Session, text: &str) -> Result<TurnOutput, TurnError> {
        match session.state() {
            ResourceState::Uninitialized => {
                return Err(TurnError::NotReady(ResourceState::Uninitialized))
            }
            ResourceState::ClientReady => return Err(TurnError::NotReady(ResourceState::ClientReady)),
            ResourceState::ToolkitReady | ResourceState::AgentReady => {}
        }

        let built = self
            .manager
            .ensure_agent(session)
            .map_err(TurnError::Lifecycle)?;

        let user_turn = Turn::user(text);
        let mut candidate = session.history.clone();
        candidate.append(user_turn.clone());

        tracing::info!(session = %session.id(), agent = %built.id, history = candidate.len(), "invoking agent");
        let output = self
            .extractor
            .invoke(built.agent.as_ref(), &candidate)
            .await
            .map_err(TurnError::Invocation)?;

        session.history.append(user_turn);
        session.history.append(Turn::assistant(output.final_text.clone()));
        Ok(output)
    }

    /// 处理一条命令
    pub async fn handle(&self, session: &mut Session, command: Command) -> Reply {
        match command {
            Command::Submit(text) => match self.submit(session, &text).await {
                Ok(output) => Reply::Answer(output),
                Err(e @ TurnError::NotReady(_)) => Reply::Warning(e.user_message()),
                Err(e) => Reply::Error(e.user_message()),
            },
            Command::SetApiKey(key) => {
                self.manager.on_api_key_changed(session, ApiKey::new(key));
                match self.manager.ensure_client(session) {
                    Ok(_) => Reply::Notice(
                        "API key accepted, AI engine is active. Use /connect to attach the database."
                            .to_string(),
                    ),
                    Err(e) => lifecycle_reply(e),
                }
            }
            Command::SetLanguage(language) => {
                if self.manager.on_language_changed(session, language) {
                    Reply::Notice(format!(
                        "Answer language set to {language}. The agent will be rebuilt on the next question."
                    ))
                } else {
                    Reply::Notice(format!("Answer language is already {language}."))
                }
            }
            Command::Connect => match self.manager.connect(session) {
                Ok(ConnectOutcome::AlreadyActive) => {
                    Reply::Notice("Database is already connected.".to_string())
                }
                Ok(ConnectOutcome::Connected) => {
                    Reply::Notice(not_ready_message(ResourceState::AgentReady).to_string())
                }
                Err(e) => lifecycle_reply(e),
            },
            Command::ClearChat => {
                self.manager.reset_soft(session);
                Reply::Notice("Conversation cleared.".to_string())
            }
            Command::ResetAll => {
                self.manager.reset_full(session);
                Reply::Notice("Session reset. Use /connect to start again.".to_string())
            }
            Command::Status => Reply::Status(session.snapshot()),
            Command::Help => Reply::Help,
            Command::Quit => Reply::Quit,
        }
    }
}

fn lifecycle_reply(err: LifecycleError) -> Reply {
    match err {
        LifecycleError::Classified(_) => Reply::Error(err.user_message()),
        LifecycleError::MissingApiKey | LifecycleError::NotReady(_) => {
            Reply::Warning(err.user_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn orchestrator() -> Orchestrator {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg.database.uri = "sqlite:///:memory:".to_string();
        Orchestrator::new(ResourceManager::new(cfg))
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   "), Ok(None));
        assert_eq!(
            Command::parse("how many rows?"),
            Ok(Some(Command::Submit("how many rows?".to_string())))
        );
        assert_eq!(
            Command::parse("/key abc"),
            Ok(Some(Command::SetApiKey("abc".to_string())))
        );
        assert_eq!(
            Command::parse("/lang indonesian"),
            Ok(Some(Command::SetLanguage(Language::Indonesian)))
        );
        assert_eq!(Command::parse("/CONNECT"), Ok(Some(Command::Connect)));
        assert_eq!(Command::parse("/clear"), Ok(Some(Command::ClearChat)));
        assert_eq!(Command::parse("/reset"), Ok(Some(Command::ResetAll)));
        assert_eq!(Command::parse("/quit"), Ok(Some(Command::Quit)));
        assert!(Command::parse("/key").is_err());
        assert!(Command::parse("/lang klingon").is_err());
        assert!(Command::parse("/frobnicate").is_err());
    }

    #[tokio::test]
    async fn test_submit_guardrails() {
        let orch = orchestrator();
        let mut session = orch.new_session();

        let err = orch.submit(&mut session, "hi").await.unwrap_err();
        assert_eq!(err, TurnError::NotReady(ResourceState::Uninitialized));
        assert!(err.user_message().contains("API key"));

        orch.handle(&mut session, Command::SetApiKey("k".to_string())).await;
        let err = orch.submit(&mut session, "hi").await.unwrap_err();
        assert_eq!(err, TurnError::NotReady(ResourceState::ClientReady));
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_connect_then_submit_with_mock() {
        let orch = orchestrator();
        let mut session = orch.new_session();
        orch.handle(&mut session, Command::SetApiKey("k".to_string())).await;
        assert!(matches!(
            orch.handle(&mut session, Command::Connect).await,
            Reply::Notice(_)
        ));

        let out = orch.submit(&mut session, "ping").await.unwrap();
        assert_eq!(out.final_text, "(mock) you asked: ping");
        assert_eq!(session.history().len(), 2);

        orch.handle(&mut session, Command::ClearChat).await;
        assert!(session.history().is_empty());
        assert_eq!(session.state(), ResourceState::AgentReady);
    }

    #[tokio::test]
    async fn test_agent_rebuilt_lazily_after_language_change() {
        let orch = orchestrator();
        let mut session = orch.new_session();
        orch.handle(&mut session, Command::SetApiKey("k".to_string())).await;
        orch.handle(&mut session, Command::Connect).await;
        orch.handle(&mut session, Command::SetLanguage(Language::Indonesian))
            .await;
        assert_eq!(session.state(), ResourceState::ToolkitReady);

        orch.submit(&mut session, "halo").await.unwrap();
        assert_eq!(session.state(), ResourceState::AgentReady);
        assert_eq!(
            session.resources().agent().map(|a| a.language),
            Some(Language::Indonesian)
        );
    }

    #[tokio::test]
    async fn test_connect_without_key_warns() {
        let orch = orchestrator();
        let mut session = orch.new_session();
        match orch.handle(&mut session, Command::Connect).await {
            Reply::Warning(msg) => assert!(msg.contains("API key")),
            other => panic!("expected warning, got {other:?}"),
        }
    }
}
