mod repl;

use clap::Parser;
use navi_engine::api::HttpNavigationApi;
use navi_engine::config::{ConfigLoader, NaviConfig};
use navi_engine::conversation::ConversationMapper;
use navi_engine::orchestrator::{NavigationOrchestrator, OrchestratorOptions};
use navi_r::EventChannel;
use repl::{ReplOptions, Session};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "navi", version, about = "Drive an AI browser navigation from the terminal")]
struct Args {
    /// Browser session to navigate in
    #[arg(long)]
    session: Option<String>,

    /// Vision model id (see /models)
    #[arg(long)]
    model: Option<String>,

    /// Step limit sent with each start request
    #[arg(long)]
    max_steps: Option<u32>,

    /// Base URL of the navigation HTTP API
    #[arg(long)]
    api_url: Option<String>,

    /// WebSocket URL of the shared event channel
    #[arg(long)]
    events_url: Option<String>,

    /// Fail a navigation locally after this many milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Config file (defaults to ./navi.yaml, then ~/.navi/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Script of prompts and commands to execute (non-interactive mode)
    #[arg(long)]
    file: Option<String>,
}

async fn load_config(args: &Args) -> anyhow::Result<NaviConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = ConfigLoader::load_from(path).await?;
            ConfigLoader::apply_env(&mut config);
            config
        }
        None => ConfigLoader::load_default().await?,
    };

    if let Some(url) = &args.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(url) = &args.events_url {
        config.events.url = url.clone();
    }
    if let Some(model) = &args.model {
        config.navigation.default_model = model.clone();
    }
    if let Some(n) = args.max_steps {
        config.navigation.default_max_steps = n;
    }
    if let Some(ms) = args.deadline_ms {
        config.navigation.deadline_ms = Some(ms);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with the timeline on stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args).await?;
    info!(
        "Using API {} and event channel {}",
        config.api.base_url, config.events.url
    );

    let api = HttpNavigationApi::new(
        &config.api.base_url,
        Duration::from_millis(config.api.request_timeout_ms),
    )?;
    let mut orchestrator = NavigationOrchestrator::new(
        Arc::new(api),
        OrchestratorOptions::from(&config.navigation),
    );
    if let Some(session_id) = args.session.clone() {
        orchestrator = orchestrator.with_session(session_id);
    }
    let mapper = ConversationMapper::new(
        orchestrator,
        config.navigation.default_model.clone(),
        Some(config.navigation.default_max_steps),
    );

    let channel = EventChannel::connect(
        &config.events.url,
        config.events.buffer_capacity,
        Duration::from_millis(config.events.reconnect_delay_ms),
    )?;
    let mut session = Session::new(mapper, channel.subscribe());

    let result = match &args.file {
        Some(path) => repl::run_file(&mut session, path).await,
        None => {
            let banner = if args.session.is_some() {
                "Describe where to go. Type /help for commands, 'exit' to quit."
            } else {
                "No browser session selected. Use /session <id> first, /help for commands."
            };
            repl::run_repl(
                &mut session,
                ReplOptions {
                    banner_lines: &[banner],
                    prompt: "> ",
                    exit_commands: &["exit", "quit"],
                },
            )
            .await
        }
    };

    channel.close().await;
    result
}
