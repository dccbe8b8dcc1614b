use navi_engine::conversation::{ConversationMapper, TimelineUpdate};
use navi_engine::formatter::{format_models, format_session, format_timeline, format_update};
use navi_engine::models::ModelRegistry;
use navi_engine::observer::Subscription;
use navi_engine::protocol::ChannelMessage;
use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::warn;

const HELP: &str = "\
Type a goal in plain language to start a navigation.
  /abort           stop the running navigation
  /resume          continue after a human intervention
  /clear           clear the conversation
  /session [id]    show or switch the browser session
  /model [id]      show or switch the model
  /models          list available models
  /steps [n]       show or set the step limit
  /status          show the current navigation
  /history         show the conversation
  /help            show this help";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Prompt(String),
    Abort,
    Resume,
    Clear,
    Session(Option<String>),
    Model(Option<String>),
    Models,
    MaxSteps(Option<u32>),
    Status,
    History,
    Help,
    Exit,
}

/// Prompts are passed through exactly as typed; the mapper keeps the raw text.
pub fn parse_command(line: &str, exit_commands: &[&str]) -> Result<ReplCommand, String> {
    let trimmed = line.trim();
    if exit_commands.contains(&trimmed) {
        return Ok(ReplCommand::Exit);
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(ReplCommand::Prompt(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::to_string);
    if parts.next().is_some() {
        return Err(format!("Too many arguments for /{}", name));
    }

    match name {
        "abort" => Ok(ReplCommand::Abort),
        "resume" => Ok(ReplCommand::Resume),
        "clear" => Ok(ReplCommand::Clear),
        "session" => Ok(ReplCommand::Session(arg)),
        "model" => Ok(ReplCommand::Model(arg)),
        "models" => Ok(ReplCommand::Models),
        "steps" => match arg {
            None => Ok(ReplCommand::MaxSteps(None)),
            Some(n) => n
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .map(|n| ReplCommand::MaxSteps(Some(n)))
                .ok_or_else(|| format!("Invalid step limit: {}", n)),
        },
        "status" => Ok(ReplCommand::Status),
        "history" => Ok(ReplCommand::History),
        "help" => Ok(ReplCommand::Help),
        other => Err(format!("Unknown command: /{}", other)),
    }
}

pub struct ReplOptions<'a> {
    pub banner_lines: &'a [&'a str],
    pub prompt: &'a str,
    pub exit_commands: &'a [&'a str],
}

/// Conversation plus the two streams it is fed from.
pub struct Session {
    pub mapper: ConversationMapper,
    pub events: broadcast::Receiver<ChannelMessage>,
    timeline: Subscription<TimelineUpdate>,
}

impl Session {
    pub fn new(mut mapper: ConversationMapper, events: broadcast::Receiver<ChannelMessage>) -> Self {
        let timeline = mapper.subscribe();
        Self {
            mapper,
            events,
            timeline,
        }
    }

    fn flush(&mut self) {
        for update in self.timeline.drain() {
            if let Some(text) = format_update(self.mapper.messages(), &update) {
                println!("{}", text);
            }
        }
    }

    fn on_event(&mut self, event: Result<ChannelMessage, RecvError>) -> bool {
        match event {
            Ok(msg) => {
                self.mapper.handle_event(&msg);
                self.flush();
                true
            }
            Err(RecvError::Lagged(n)) => {
                warn!("Event channel lagged, {} message(s) dropped", n);
                true
            }
            Err(RecvError::Closed) => {
                warn!("Event channel closed");
                false
            }
        }
    }

    fn on_deadline(&mut self) {
        self.mapper.check_deadline(Instant::now());
        self.flush();
    }

    /// Returns false when the session should end.
    async fn execute(&mut self, command: ReplCommand) -> bool {
        match command {
            ReplCommand::Prompt(text) => {
                // Failures surface as a system message in the timeline.
                let _ = self.mapper.send_message(&text).await;
            }
            ReplCommand::Abort => {
                if !self.mapper.orchestrator().can_abort() {
                    println!("No navigation to abort");
                } else if let Err(e) = self.mapper.abort_navigation().await {
                    println!("Error: {}", e);
                } else {
                    println!("Abort requested");
                }
            }
            ReplCommand::Resume => {
                if let Err(e) = self.mapper.resume_navigation().await {
                    println!("Error: {}", e);
                }
            }
            ReplCommand::Clear => self.mapper.clear_conversation(),
            ReplCommand::Session(None) => {
                println!(
                    "Session: {}",
                    self.mapper.session_id().unwrap_or("(none)")
                );
            }
            ReplCommand::Session(Some(id)) => {
                if self.mapper.set_session_id(Some(id.clone())) {
                    println!("Switched to session {}", id);
                }
            }
            ReplCommand::Model(None) => println!("Model: {}", self.mapper.model()),
            ReplCommand::Model(Some(id)) => {
                if ModelRegistry::contains(&id) {
                    self.mapper.set_model(id);
                } else {
                    println!("Unknown model: {}", id);
                }
            }
            ReplCommand::Models => {
                println!("{}", format_models(self.mapper.model()));
            }
            ReplCommand::MaxSteps(None) => match self.mapper.max_steps() {
                Some(n) => println!("Step limit: {}", n),
                None => println!("Step limit: server default"),
            },
            ReplCommand::MaxSteps(Some(n)) => self.mapper.set_max_steps(Some(n)),
            ReplCommand::Status => {
                let orch = self.mapper.orchestrator();
                println!("{}", format_session(orch.session(), orch.phase()));
            }
            ReplCommand::History => println!("{}", format_timeline(self.mapper.messages())),
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Exit => return false,
        }
        self.flush();
        true
    }

    /// Drive events until the current navigation is no longer active.
    async fn wait_for_navigation(&mut self) -> bool {
        while self.mapper.orchestrator().phase().is_active() {
            let deadline = self.mapper.orchestrator().deadline();
            tokio::select! {
                event = self.events.recv() => {
                    if !self.on_event(event) {
                        return false;
                    }
                }
                _ = sleep_until(deadline) => self.on_deadline(),
                _ = tokio::signal::ctrl_c() => return false,
            }
        }
        true
    }
}

fn sleep_until(deadline: Option<Instant>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    match deadline {
        Some(at) => Box::pin(tokio::time::sleep_until(at)),
        None => Box::pin(std::future::pending::<()>()),
    }
}

pub async fn run_repl(session: &mut Session, options: ReplOptions<'_>) -> anyhow::Result<()> {
    for line in options.banner_lines {
        println!("{}", line);
    }

    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();
    print!("{}", options.prompt);
    stdout.flush()?;

    loop {
        let deadline = session.mapper.orchestrator().deadline();
        tokio::select! {
            line = reader.next_line() => {
                let Some(line) = line? else { break };
                if !line.trim().is_empty() {
                    match parse_command(&line, options.exit_commands) {
                        Ok(command) => {
                            if !session.execute(command).await {
                                break;
                            }
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                }
                print!("{}", options.prompt);
                stdout.flush()?;
            }
            event = session.events.recv() => {
                if !session.on_event(event) {
                    break;
                }
            }
            _ = sleep_until(deadline) => session.on_deadline(),
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

/// Run commands from a file. Each prompt blocks until its navigation ends.
pub async fn run_file(session: &mut Session, path: &str) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path).await?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let command = parse_command(line, &[])
            .map_err(|e| anyhow::anyhow!("Error executing line '{}': {}", trimmed, e))?;
        let waits = matches!(command, ReplCommand::Prompt(_) | ReplCommand::Resume);
        if !session.execute(command).await {
            break;
        }
        if waits && !session.wait_for_navigation().await {
            break;
        }
    }
    Ok(())
}
