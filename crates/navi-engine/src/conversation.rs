//! Chat-style timeline built on top of the [`NavigationOrchestrator`].
//!
//! Every prompt produces a user message and a paired assistant message. The
//! assistant message is correlated to its navigation by `navigation_id`, which
//! is stamped once when the start request succeeds and never reassigned.
//!
//! History is scoped to one browser session: switching sessions clears it.

use crate::observer::{Observers, Subscription, SubscriptionId};
use crate::orchestrator::{NavigationError, NavigationOrchestrator, OrchestratorNotice};
use chrono::{DateTime, Utc};
use navi_common::protocol::{
    ChannelMessage, HumanInterventionState, NavigationStatus, NavigationStep,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Running,
    AwaitingHuman,
    Completed,
    Failed,
    Aborted,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            MessageStatus::Completed | MessageStatus::Failed | MessageStatus::Aborted => true,
            MessageStatus::Pending | MessageStatus::Running | MessageStatus::AwaitingHuman => false,
        }
    }

    /// The server still accepts an abort while a human is in the loop.
    pub fn can_abort(self) -> bool {
        match self {
            MessageStatus::Running | MessageStatus::AwaitingHuman => true,
            MessageStatus::Pending
            | MessageStatus::Completed
            | MessageStatus::Failed
            | MessageStatus::Aborted => false,
        }
    }

    /// Terminal navigation status projected onto the message vocabulary, with
    /// an explanatory note for the statuses folded into `Failed`.
    pub fn from_terminal(status: NavigationStatus) -> (Self, Option<&'static str>) {
        match status {
            NavigationStatus::Completed => (MessageStatus::Completed, None),
            NavigationStatus::Aborted => (MessageStatus::Aborted, None),
            NavigationStatus::MaxStepsReached => (
                MessageStatus::Failed,
                Some("Stopped after reaching the step limit"),
            ),
            NavigationStatus::LoopDetected => (
                MessageStatus::Failed,
                Some("Stopped after detecting a repeated action loop"),
            ),
            NavigationStatus::Failed | NavigationStatus::Idle | NavigationStatus::Navigating => {
                (MessageStatus::Failed, None)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
    // Assistant messages only.
    pub navigation_id: Option<String>,
    pub status: Option<MessageStatus>,
    pub steps: Vec<NavigationStep>,
    pub total_tokens: u64,
    /// Server quote returned with the start response.
    pub estimated_cost: Option<f64>,
    pub human_intervention: Option<HumanInterventionState>,
    pub note: Option<String>,
    pub error: Option<String>,
}

impl ConversationMessage {
    fn new(role: MessageRole, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            navigation_id: None,
            status: None,
            steps: Vec::new(),
            total_tokens: 0,
            estimated_cost: None,
            human_intervention: None,
            note: None,
            error: None,
        }
    }

    pub fn user(text: &str) -> Self {
        Self::new(MessageRole::User, Some(text.to_string()))
    }

    pub fn assistant() -> Self {
        let mut msg = Self::new(MessageRole::Assistant, None);
        msg.status = Some(MessageStatus::Pending);
        msg
    }

    pub fn system(text: &str) -> Self {
        Self::new(MessageRole::System, Some(text.to_string()))
    }

    pub fn can_abort(&self) -> bool {
        self.status.is_some_and(MessageStatus::can_abort)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineUpdate {
    MessageAdded {
        message_id: String,
        role: MessageRole,
    },
    Step {
        message_id: String,
        step: NavigationStep,
    },
    StatusChanged {
        message_id: String,
        status: MessageStatus,
    },
    Cleared,
}

pub struct ConversationMapper {
    orchestrator: NavigationOrchestrator,
    messages: Vec<ConversationMessage>,
    model: String,
    max_steps: Option<u32>,
    observers: Observers<TimelineUpdate>,
}

impl ConversationMapper {
    pub fn new(
        orchestrator: NavigationOrchestrator,
        model: impl Into<String>,
        max_steps: Option<u32>,
    ) -> Self {
        Self {
            orchestrator,
            messages: Vec::new(),
            model: model.into(),
            max_steps,
            observers: Observers::new(),
        }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn orchestrator(&self) -> &NavigationOrchestrator {
        &self.orchestrator
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn max_steps(&self) -> Option<u32> {
        self.max_steps
    }

    pub fn set_max_steps(&mut self, max_steps: Option<u32>) {
        self.max_steps = max_steps;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.orchestrator.session_id()
    }

    /// Switch the browser session. A different id drops the conversation
    /// history and the local navigation state. Returns whether anything changed.
    pub fn set_session_id(&mut self, session_id: Option<String>) -> bool {
        if self.orchestrator.session_id() == session_id.as_deref() {
            return false;
        }
        debug!("Browser session changed to {:?}, clearing conversation", session_id);
        self.clear_conversation();
        self.orchestrator.set_session_id(session_id);
        true
    }

    pub fn subscribe(&mut self) -> Subscription<TimelineUpdate> {
        self.observers.subscribe()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Send a prompt. Whitespace-only input is silently ignored.
    pub async fn send_message(&mut self, text: &str) -> Result<(), NavigationError> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Ok(());
        }

        self.push(ConversationMessage::user(text));
        let assistant_id = self.push(ConversationMessage::assistant());

        let result = self
            .orchestrator
            .start_navigation(prompt, &self.model, self.max_steps)
            .await;

        match result {
            Ok(outcome) => {
                if let Some(msg) = self.messages.iter_mut().find(|m| m.id == assistant_id) {
                    msg.navigation_id = Some(outcome.navigation_id);
                    msg.estimated_cost = outcome.estimated_cost;
                }
                for notice in outcome.replayed {
                    self.apply_notice(notice);
                }
                Ok(())
            }
            Err(e) => {
                if let Some(msg) = self.messages.iter_mut().find(|m| m.id == assistant_id) {
                    msg.status = Some(MessageStatus::Failed);
                    msg.error = Some(e.to_string());
                }
                self.observers.emit(&TimelineUpdate::StatusChanged {
                    message_id: assistant_id,
                    status: MessageStatus::Failed,
                });
                self.add_system_message(&e.to_string());
                Err(e)
            }
        }
    }

    /// Feed one channel message through the orchestrator and project the
    /// result onto the timeline. Returns whether the message was relevant.
    pub fn handle_event(&mut self, msg: &ChannelMessage) -> bool {
        match self.orchestrator.ingest(msg) {
            Some(notice) => {
                self.apply_notice(notice);
                true
            }
            None => false,
        }
    }

    pub fn check_deadline(&mut self, now: Instant) -> bool {
        match self.orchestrator.check_deadline(now) {
            Some(notice) => {
                self.apply_notice(notice);
                true
            }
            None => false,
        }
    }

    pub fn begin_intervention(&mut self, intervention: HumanInterventionState) -> bool {
        match self.orchestrator.begin_intervention(intervention) {
            Some(notice) => {
                self.apply_notice(notice);
                true
            }
            None => false,
        }
    }

    pub async fn resume_navigation(&mut self) -> Result<(), NavigationError> {
        if let Some(notice) = self.orchestrator.resume_navigation().await? {
            self.apply_notice(notice);
        }
        Ok(())
    }

    /// Forwards only. The message is marked aborted by the completion event.
    pub async fn abort_navigation(&mut self) -> Result<(), NavigationError> {
        self.orchestrator.abort_navigation().await
    }

    pub fn clear_conversation(&mut self) {
        self.messages.clear();
        self.orchestrator.reset();
        self.observers.emit(&TimelineUpdate::Cleared);
    }

    pub fn add_system_message(&mut self, text: &str) -> String {
        self.push(ConversationMessage::system(text))
    }

    fn push(&mut self, msg: ConversationMessage) -> String {
        let id = msg.id.clone();
        let role = msg.role;
        self.messages.push(msg);
        self.observers.emit(&TimelineUpdate::MessageAdded {
            message_id: id.clone(),
            role,
        });
        id
    }

    fn correlated_mut(&mut self, navigation_id: &str) -> Option<&mut ConversationMessage> {
        self.messages.iter_mut().find(|m| {
            m.role == MessageRole::Assistant && m.navigation_id.as_deref() == Some(navigation_id)
        })
    }

    fn apply_notice(&mut self, notice: OrchestratorNotice) {
        let Some(msg) = self.correlated_mut(notice.navigation_id()) else {
            debug!(
                "No message correlated to navigation {}",
                notice.navigation_id()
            );
            return;
        };
        let message_id = msg.id.clone();

        let update = match notice {
            OrchestratorNotice::Step { step, .. } => {
                msg.steps.push(step.clone());
                msg.total_tokens = msg
                    .steps
                    .iter()
                    .fold(0u64, |acc, s| acc.saturating_add(s.tokens_used.total_tokens));
                // A pending intervention is cleared only by resume or completion.
                if msg.human_intervention.is_none() {
                    msg.status = Some(MessageStatus::Running);
                }
                TimelineUpdate::Step { message_id, step }
            }
            OrchestratorNotice::Complete {
                status,
                summary,
                error,
                ..
            } => {
                let (mapped, note) = MessageStatus::from_terminal(status);
                msg.status = Some(mapped);
                msg.note = note.map(str::to_string);
                if let Some(summary) = summary {
                    msg.content = Some(summary);
                }
                if error.is_some() {
                    msg.error = error;
                }
                msg.human_intervention = None;
                TimelineUpdate::StatusChanged {
                    message_id,
                    status: mapped,
                }
            }
            OrchestratorNotice::InterventionStarted { intervention, .. } => {
                msg.status = Some(MessageStatus::AwaitingHuman);
                msg.human_intervention = Some(intervention);
                TimelineUpdate::StatusChanged {
                    message_id,
                    status: MessageStatus::AwaitingHuman,
                }
            }
            OrchestratorNotice::InterventionCleared { .. } => {
                msg.status = Some(MessageStatus::Running);
                msg.human_intervention = None;
                TimelineUpdate::StatusChanged {
                    message_id,
                    status: MessageStatus::Running,
                }
            }
        };
        self.observers.emit(&update);
    }
}
