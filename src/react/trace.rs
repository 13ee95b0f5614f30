//! 推理轨迹提取
//!
//! 用完整历史调用 Agent，截取本轮新增的消息（delta），逐条归类为 action / observation / thought / final，
//! 并取出去掉终答标记的最终回答。判定 final 依据结构（delta 最后一条有文本的消息），标记只做外观清理。

use serde::Serialize;
use serde_json::Value;

use crate::config::AgentSection;
use crate::core::{ClassifiedError, ErrorClassifier, Stage};
use crate::memory::{AgentMessage, ConversationHistory};
use crate::react::ReasoningAgent;

/// 推理步骤种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Action,
    Observation,
    Thought,
    Final,
}

/// 一个已归类的推理步骤；tool_name/tool_args 只出现在 Action，text 只出现在其余三类
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningStep {
    Action { tool_name: String, tool_args: Value },
    Observation { text: String },
    Thought { text: String },
    Final { text: String },
}

impl ReasoningStep {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Action { .. } => StepKind::Action,
            Self::Observation { .. } => StepKind::Observation,
            Self::Thought { .. } => StepKind::Thought,
            Self::Final { .. } => StepKind::Final,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Action { .. } => None,
            Self::Observation { text } | Self::Thought { text } | Self::Final { text } => Some(text),
        }
    }
}

/// 轨迹提取参数
#[derive(Clone, Debug)]
pub struct TraceOptions {
    pub final_marker: String,
    /// Observation 展示截断长度（字符）
    pub observation_display_chars: usize,
    pub fallback_text: String,
}

pub const NO_RESPONSE_FALLBACK: &str = "I'm sorry, no response was produced.";

impl Default for TraceOptions {
    fn default() -> Self {
        Self::from(&AgentSection::default())
    }
}

impl From<&AgentSection> for TraceOptions {
    fn from(section: &AgentSection) -> Self {
        Self {
            final_marker: section.final_marker.clone(),
            observation_display_chars: section.observation_display_chars,
            fallback_text: NO_RESPONSE_FALLBACK.to_string(),
        }
    }
}

/// 单轮调用结果
#[derive(Clone, Debug, Serialize)]
pub struct TurnOutput {
    pub final_text: String,
    pub steps: Vec<ReasoningStep>,
}

/// 按结构归类 delta 中的每条消息（先匹配者优先）
pub fn classify_delta(delta: &[AgentMessage], options: &TraceOptions) -> Vec<ReasoningStep> {
    let mut steps = Vec::with_capacity(delta.len());
    let last = delta.len().saturating_sub(1);
    for (i, message) in delta.iter().enumerate() {
        let calls = message.tool_calls();
        if !calls.is_empty() {
            steps.extend(calls.iter().map(|c| ReasoningStep::Action {
                tool_name: c.name.clone(),
                tool_args: c.args.clone(),
            }));
        } else if message.is_tool_result() {
            steps.push(ReasoningStep::Observation {
                text: message
                    .content()
                    .chars()
                    .take(options.observation_display_chars)
                    .collect(),
            });
        } else if !message.content().trim().is_empty() {
            let text = message.content().to_string();
            if i == last {
                steps.push(ReasoningStep::Final { text });
            } else {
                steps.push(ReasoningStep::Thought { text });
            }
        }
    }
    steps
}

/// 去掉前导终答标记与首尾空白；缺少标记时原样使用并记录警告
pub fn strip_final_marker(text: &str, marker: &str) -> String {
    let trimmed = text.trim();
    let marker = marker.trim();
    if !marker.is_empty() {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return rest.trim().to_string();
        }
        tracing::warn!(marker, "final answer does not start with the expected marker");
    }
    trimmed.to_string()
}

/// 取最终回答：有 Final 步骤则去标记，否则用兜底文本
pub fn final_text(steps: &[ReasoningStep], options: &TraceOptions) -> String {
    steps
        .iter()
        .find_map(|s| match s {
            ReasoningStep::Final { text } => Some(strip_final_marker(text, &options.final_marker)),
            _ => None,
        })
        .unwrap_or_else(|| options.fallback_text.clone())
}

/// 调用 Agent 并提取轨迹；不修改 history，调用方负责在成功后追加回答
#[derive(Clone, Debug, Default)]
pub struct TraceExtractor {
    options: TraceOptions,
    classifier: ErrorClassifier,
}

impl TraceExtractor {
    pub fn new(options: TraceOptions, classifier: ErrorClassifier) -> Self {
        Self {
            options,
            classifier,
        }
    }

    pub fn options(&self) -> &TraceOptions {
        &self.options
    }

    pub async fn invoke(
        &self,
        agent: &dyn ReasoningAgent,
        history: &ConversationHistory,
    ) -> Result<TurnOutput, ClassifiedError> {
        let messages = history.to_model_messages();
        let start_len = messages.len();

        let returned = agent.invoke(messages).await.map_err(|raw| {
            let err = self.classifier.classify(Stage::Invocation, raw);
            tracing::warn!(category = %err.category, "agent invocation failed");
            err
        })?;

        let delta = match returned.get(start_len..) {
            Some(d) => d,
            None => {
                tracing::warn!(
                    start_len,
                    returned = returned.len(),
                    "agent returned fewer messages than it was given"
                );
                &[]
            }
        };

        let steps = classify_delta(delta, &self.options);
        let final_text = final_text(&steps, &self.options);
        tracing::info!(new_messages = delta.len(), steps = steps.len(), "turn trace extracted");
        Ok(TurnOutput { final_text, steps })
    }
}
