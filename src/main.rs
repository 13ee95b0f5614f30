//! InsightSQL 命令行入口
//!
//! 用法：insight-sql [config.toml]。初始化日志、加载配置，从 [llm].api_key_env 读取初始 API Key，然后运行 REPL。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use insight_sql::config::load_config_or_default;
use insight_sql::core::{Command, Orchestrator, Reply, ResourceManager, HELP_TEXT};
use insight_sql::observability;
use insight_sql::react::{ReasoningStep, TurnOutput};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config_or_default(config_path);
    let api_key_env = cfg.llm.api_key_env.clone();

    let orchestrator = Orchestrator::new(ResourceManager::new(cfg));
    let mut session = orchestrator.new_session();

    println!("🔎 InsightSQL - ask questions about your database. Type /help for commands.");

    if let Ok(key) = std::env::var(&api_key_env) {
        let reply = orchestrator
            .handle(&mut session, Command::SetApiKey(key))
            .await;
        let client_ready = matches!(reply, Reply::Notice(_));
        render(&reply);
        if client_ready {
            render(&orchestrator.handle(&mut session, Command::Connect).await);
        }
    } else {
        println!("⚠️  Please enter your API key to proceed (/key <value>).");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("[{}] > ", session.language());
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let command = match Command::parse(&line) {
            Ok(Some(c)) => c,
            Ok(None) => continue,
            Err(e) => {
                println!("⚠️  {e}");
                continue;
            }
        };
        if let Command::Submit(_) = command {
            println!("🤔 Agent is analyzing the data...");
        }

        let reply = orchestrator.handle(&mut session, command).await;
        if matches!(reply, Reply::Quit) {
            break;
        }
        render(&reply);
    }

    println!("👋 Bye.");
    Ok(())
}

fn render(reply: &Reply) {
    match reply {
        Reply::Answer(output) => render_answer(output),
        Reply::Notice(msg) => println!("✅ {msg}"),
        Reply::Warning(msg) => println!("⚠️  {msg}"),
        Reply::Error(msg) => println!("❌ {msg}"),
        Reply::Status(snapshot) => match serde_json::to_string_pretty(snapshot) {
            Ok(json) => println!("{json}"),
            Err(e) => println!("❌ {e}"),
        },
        Reply::Help => println!("{HELP_TEXT}"),
        Reply::Quit => {}
    }
}

fn render_answer(output: &TurnOutput) {
    if !output.steps.is_empty() {
        println!("🧠 Reasoning process ({} steps)", output.steps.len());
    }
    for step in &output.steps {
        match step {
            ReasoningStep::Action {
                tool_name,
                tool_args,
            } => println!("  🛠️  Action: {tool_name}\n      Arguments: {tool_args}"),
            ReasoningStep::Observation { text } => println!("  📄 Observation: {text}"),
            ReasoningStep::Thought { text } => println!("  💭 Thought: {text}"),
            ReasoningStep::Final { .. } => println!("  ✅ Analysis complete."),
        }
    }
    println!("\n{}\n", output.final_text);
}
