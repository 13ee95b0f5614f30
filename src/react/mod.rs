//! 推理层：Agent 抽象与默认 ReAct 实现、输出解析、系统指令、推理轨迹提取

pub mod agent;
pub mod planner;
pub mod prompt;
pub mod trace;

pub use agent::{AgentFactory, ReactAgent, ReactAgentFactory, ReasoningAgent};
pub use planner::{parse_llm_output, ParsedToolCall, PlannerOutput};
pub use prompt::{
    build_system_prompt, load_instructions_template, render_instructions, DEFAULT_INSTRUCTIONS,
};
pub use trace::{
    classify_delta, final_text, strip_final_marker, ReasoningStep, StepKind, TraceExtractor,
    TraceOptions, TurnOutput, NO_RESPONSE_FALLBACK,
};
