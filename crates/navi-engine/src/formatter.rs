use crate::conversation::{ConversationMessage, MessageRole, MessageStatus, TimelineUpdate};
use crate::orchestrator::{NavigationSession, SessionPhase};
use navi_common::formatter::{format_intervention, format_step};
use navi_common::models::ModelRegistry;

fn status_label(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Pending => "pending",
        MessageStatus::Running => "running",
        MessageStatus::AwaitingHuman => "awaiting human",
        MessageStatus::Completed => "completed",
        MessageStatus::Failed => "failed",
        MessageStatus::Aborted => "aborted",
    }
}

pub fn format_message(msg: &ConversationMessage) -> String {
    match msg.role {
        MessageRole::User => format!("you: {}", msg.content.as_deref().unwrap_or_default()),
        MessageRole::System => format!("system: {}", msg.content.as_deref().unwrap_or_default()),
        MessageRole::Assistant => {
            let status = msg.status.map(status_label).unwrap_or("pending");
            let mut output = format!(
                "assistant [{}] {} step(s), {} tokens",
                status,
                msg.steps.len(),
                msg.total_tokens
            );
            if let Some(cost) = msg.estimated_cost {
                output.push_str(&format!(", quoted ${:.4}", cost));
            }
            for step in &msg.steps {
                output.push_str(&format!("\n  {}", format_step(step).replace('\n', "\n  ")));
            }
            if let Some(intervention) = &msg.human_intervention {
                output.push_str(&format!(
                    "\n  {}\n  Type /resume when done.",
                    format_intervention(intervention).replace('\n', "\n  ")
                ));
            }
            if let Some(note) = &msg.note {
                output.push_str(&format!("\n  Note: {}", note));
            }
            if let Some(err) = &msg.error {
                output.push_str(&format!("\n  Error: {}", err));
            }
            if let Some(content) = &msg.content {
                output.push_str(&format!("\n  {}", content));
            }
            output
        }
    }
}

pub fn format_timeline(messages: &[ConversationMessage]) -> String {
    if messages.is_empty() {
        return "No messages".to_string();
    }
    messages
        .iter()
        .map(format_message)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_session(session: &NavigationSession, phase: SessionPhase) -> String {
    let phase = match phase {
        SessionPhase::Idle => "idle".to_string(),
        SessionPhase::Starting => "starting".to_string(),
        SessionPhase::Navigating => "navigating".to_string(),
        SessionPhase::AwaitingHuman => "awaiting human".to_string(),
        SessionPhase::Finished(status) => status.to_string(),
    };
    let mut output = format!(
        "Phase: {}\nNavigation: {}\nSteps: {}\nTokens: {}",
        phase,
        session.navigation_id.as_deref().unwrap_or("-"),
        session.steps.len(),
        session.total_tokens
    );
    if let Some(cost) = session.estimated_cost() {
        output.push_str(&format!("\nEstimated cost: ${:.4}", cost));
    }
    if let Some(err) = &session.error {
        output.push_str(&format!("\nError: {}", err));
    }
    output
}

/// Incremental output for one timeline update. User echoes and freshly added
/// assistant placeholders produce nothing.
pub fn format_update(messages: &[ConversationMessage], update: &TimelineUpdate) -> Option<String> {
    let find = |id: &str| messages.iter().find(|m| m.id == id);
    match update {
        TimelineUpdate::MessageAdded { message_id, role } => match role {
            MessageRole::System => find(message_id).map(format_message),
            MessageRole::User | MessageRole::Assistant => None,
        },
        TimelineUpdate::Step { step, .. } => Some(format_step(step)),
        TimelineUpdate::StatusChanged { message_id, status } => {
            let msg = find(message_id)?;
            match status {
                MessageStatus::AwaitingHuman => msg.human_intervention.as_ref().map(|h| {
                    format!("{}\nType /resume when done.", format_intervention(h))
                }),
                MessageStatus::Running => Some("Resumed".to_string()),
                MessageStatus::Pending => None,
                MessageStatus::Completed | MessageStatus::Failed | MessageStatus::Aborted => {
                    let mut output = format!(
                        "[{}] {} step(s), {} tokens",
                        status_label(*status),
                        msg.steps.len(),
                        msg.total_tokens
                    );
                    if let Some(note) = &msg.note {
                        output.push_str(&format!("\n{}", note));
                    }
                    if let Some(err) = &msg.error {
                        output.push_str(&format!("\nError: {}", err));
                    }
                    if let Some(content) = &msg.content {
                        output.push_str(&format!("\n{}", content));
                    }
                    Some(output)
                }
            }
        }
        TimelineUpdate::Cleared => Some("Conversation cleared".to_string()),
    }
}

pub fn format_models(current: &str) -> String {
    let recommended: Vec<&str> = ModelRegistry::recommended().map(|m| m.id).collect();
    ModelRegistry::all()
        .iter()
        .map(|m| {
            format!(
                "{} {:<20} {} ({}) ${:.2}/${:.2} per 1M{}",
                if m.id == current { "*" } else { " " },
                m.id,
                m.display_name,
                m.provider,
                m.input_cost_per_1m_tokens,
                m.output_cost_per_1m_tokens,
                if recommended.contains(&m.id) {
                    " [recommended]"
                } else {
                    ""
                }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
