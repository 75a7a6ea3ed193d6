//! Parley CLI binary entry point.

use std::sync::Arc;

use clap::Parser;
use parley::agent::AgentRuntime;
use parley::agent_loop::{RunEvent, RunEventPayload, RunEventSink};
use parley::cli::{ChatArgs, Cli, Commands};
use parley::config::AppConfig;
use parley::error::ParleyError;
use parley::types::InboundMessage;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Chat(args) => handle_chat(config, args).await,
            Commands::Tools => handle_tools(config).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_chat(config: AppConfig, args: ChatArgs) -> Result<(), ParleyError> {
    let Some(message) = args.message else {
        eprintln!("Usage: parley chat \"your message here\"");
        std::process::exit(1);
    };

    let sink = args.verbose.then(event_printer);
    let runtime = AgentRuntime::start_with_events(config, sink).await?;

    let mut inbound = InboundMessage::new(message);
    if let Some(thread) = args.thread {
        inbound = inbound.on_thread(thread);
    }
    let reply = runtime.respond(inbound).await;
    runtime.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

async fn handle_tools(config: AppConfig) -> Result<(), ParleyError> {
    let runtime = AgentRuntime::start(config).await?;
    for health in runtime.health().await {
        match &health.error {
            None => eprintln!("source {}: ready", health.name),
            Some(error) => eprintln!("source {}: unavailable ({error})", health.name),
        }
    }
    for tool in runtime.tools().await.all() {
        println!("{:<28} {:<12} {}", tool.name(), tool.origin(), tool.description());
    }
    runtime.shutdown().await;
    Ok(())
}

fn event_printer() -> RunEventSink {
    Arc::new(|event: RunEvent| match &event.payload {
        RunEventPayload::ToolCallStarted { tool_name, call_id } => {
            eprintln!("⚡ {tool_name} ({call_id})");
        }
        RunEventPayload::ToolCallFinished {
            tool_name,
            is_error,
            ..
        } => {
            let mark = if *is_error { "❌" } else { "✅" };
            eprintln!("  {mark} {tool_name}");
        }
        RunEventPayload::RunFailed { error } => eprintln!("run failed: {error}"),
        _ => {}
    })
}
