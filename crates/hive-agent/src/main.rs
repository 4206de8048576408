//! # hive-agent
//!
//! Agent pool server binary — wires the broker, the runtime, the
//! fixed pool, and the distribution server together.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use hive_broker::{Broker, NatsBroker};
use hive_core::{AgentId, LOG_TOPIC, Role};
use hive_runtime::{AgentConfig, AgentPool, ProcessRuntime, SIDE_CHANNEL_TOOL};
use hive_server::AppState;

/// Agent pool server.
#[derive(Parser, Debug)]
#[command(name = "hive-agent", about = "Agent pool server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value_t = 4710)]
    port: u16,

    /// NATS server URL.
    #[arg(long, default_value = "nats://127.0.0.1:4222")]
    nats_url: String,

    /// Agent runtime command invoked once per turn.
    #[arg(long, default_value = "agent-cli")]
    runtime_cmd: String,

    /// Model passed to the runtime.
    #[arg(long, default_value = "default")]
    model: String,

    /// Working directory handed to every agent.
    #[arg(long, default_value = ".")]
    cwd: PathBuf,
}

fn worker_topics() -> Vec<String> {
    AgentId::ALL
        .into_iter()
        .filter(|id| id.role() == Role::Worker)
        .map(|id| id.topic())
        .collect()
}

/// Role-specific system prompt wiring each agent into the coordination
/// protocol.
fn system_prompt(id: AgentId) -> String {
    match id.role() {
        Role::Supervisor => format!(
            "You are the supervisor of a pool of three workers. Break incoming \
             requests into tasks and delegate each one by calling the \
             `{SIDE_CHANNEL_TOOL}` tool with `topic` set to one of {topics} and \
             `message` set to the task text. Record notable milestones by \
             publishing to `{LOG_TOPIC}`. Workers report back on your topic \
             (`{own}`); consolidate their results before answering.",
            topics = worker_topics().join(", "),
            own = id.topic(),
        ),
        Role::Worker => format!(
            "You are {id}, one of three workers coordinated by a supervisor. \
             Complete the task you are given, then report the outcome by calling \
             the `{SIDE_CHANNEL_TOOL}` tool with `topic` set to \
             `{supervisor}` and `message` set to a concise summary. Publish \
             progress notes to `{LOG_TOPIC}` as you go.",
            supervisor = AgentId::Supervisor.topic(),
        ),
    }
}

fn agent_configs(cli: &Cli) -> Vec<AgentConfig> {
    AgentId::ALL
        .into_iter()
        .map(|id| {
            let mut config = AgentConfig::new(id, &cli.model, &cli.cwd);
            config.system_prompt = Some(system_prompt(id));
            config.allowed_tools = vec![SIDE_CHANNEL_TOOL.to_owned()];
            config
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let prometheus = hive_server::metrics::install_recorder();

    let broker = Arc::new(
        NatsBroker::connect(&cli.nats_url)
            .await
            .with_context(|| format!("failed to connect to NATS at {}", cli.nats_url))?,
    );
    let runtime = Arc::new(ProcessRuntime::new(&cli.runtime_cmd));

    let pool = AgentPool::start(
        runtime,
        Arc::clone(&broker) as Arc<dyn Broker>,
        agent_configs(&cli),
    )
    .await
    .context("failed to start agent pool")?;

    let listener = tokio::net::TcpListener::bind((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.host, cli.port))?;
    let addr = listener.local_addr()?;
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(hive_server::serve(
        listener,
        AppState::new(Arc::clone(&pool), Some(prometheus)),
        shutdown.clone(),
    ));

    tracing::info!(%addr, agents = AgentId::COUNT, "hive agent pool ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    shutdown.cancel();
    pool.shutdown();
    broker.flush().await.context("broker flush failed")?;
    server.await?.context("server task failed")?;

    tracing::info!("shutdown complete");
    Ok(())
}
