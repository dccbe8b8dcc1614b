use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Token accounting reported by the server for a single step.
///
/// `total_tokens` is an opaque accounting unit and is not required to equal
/// `prompt_tokens + completion_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

/// The browser action proposed by the model for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserAction {
    Click(ClickAction),
    Type(TypeAction),
    Scroll(ScrollAction),
    Navigate(NavigateAction),
    Hover(HoverAction),
    Select(SelectAction),
    Wait(WaitAction),
    Keypress(KeypressAction),
    Done(DoneAction),
}

impl BrowserAction {
    pub fn kind(&self) -> &'static str {
        match self {
            BrowserAction::Click(_) => "click",
            BrowserAction::Type(_) => "type",
            BrowserAction::Scroll(_) => "scroll",
            BrowserAction::Navigate(_) => "navigate",
            BrowserAction::Hover(_) => "hover",
            BrowserAction::Select(_) => "select",
            BrowserAction::Wait(_) => "wait",
            BrowserAction::Keypress(_) => "keypress",
            BrowserAction::Done(_) => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClickAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypeAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrollAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<ScrollDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigateAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HoverAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeypressAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DoneAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Lifecycle status of a navigation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationStatus {
    #[default]
    Idle,
    Navigating,
    Completed,
    Failed,
    Aborted,
    MaxStepsReached,
    LoopDetected,
}

impl NavigationStatus {
    /// No further step events are expected once a session reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NavigationStatus::Completed
                | NavigationStatus::Failed
                | NavigationStatus::Aborted
                | NavigationStatus::MaxStepsReached
                | NavigationStatus::LoopDetected
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NavigationStatus::Idle => "idle",
            NavigationStatus::Navigating => "navigating",
            NavigationStatus::Completed => "completed",
            NavigationStatus::Failed => "failed",
            NavigationStatus::Aborted => "aborted",
            NavigationStatus::MaxStepsReached => "max_steps_reached",
            NavigationStatus::LoopDetected => "loop_detected",
        }
    }
}

impl std::fmt::Display for NavigationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    Captcha,
    Verification,
    LoginRequired,
    ComplexInteraction,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionTrigger {
    Programmatic,
    AiRequested,
}

/// A pause during which the session stays open but takes no automated action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanInterventionState {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub intervention_type: InterventionType,
    pub trigger: InterventionTrigger,
    pub started_at: DateTime<Utc>,
}

/// One step of a navigation as recorded locally. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationStep {
    pub id: String,
    pub step_number: u32,
    pub action: BrowserAction,
    pub reasoning: String,
    pub current_url: String,
    pub goal_achieved: bool,
    pub tokens_used: TokenUsage,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&NavigationStepEvent> for NavigationStep {
    fn from(event: &NavigationStepEvent) -> Self {
        Self {
            id: format!("{}-step-{}", event.navigation_id, event.step_number),
            step_number: event.step_number,
            action: event.action.clone(),
            reasoning: event.reasoning.clone(),
            current_url: event.current_url.clone(),
            goal_achieved: event.goal_achieved,
            tokens_used: event.tokens_used,
            duration_ms: event.duration_ms,
            error: event.error.clone(),
            timestamp: event.timestamp,
        }
    }
}

/// `ai_navigation_step` pushed over the shared channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationStepEvent {
    pub navigation_id: String,
    pub session_id: String,
    pub step_number: u32,
    pub action: BrowserAction,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub current_url: String,
    #[serde(default)]
    pub goal_achieved: bool,
    #[serde(default)]
    pub tokens_used: TokenUsage,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default = "default_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// `ai_navigation_complete` pushed over the shared channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationCompleteEvent {
    pub navigation_id: String,
    pub session_id: String,
    pub status: NavigationStatus,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub total_duration_ms: u64,
    #[serde(default)]
    pub final_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default = "default_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// `ai_navigation_intervention` pushed when the session pauses for a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionEvent {
    pub navigation_id: String,
    pub session_id: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub intervention_type: InterventionType,
    pub trigger: InterventionTrigger,
    #[serde(default = "default_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl InterventionEvent {
    pub fn to_state(&self) -> HumanInterventionState {
        HumanInterventionState {
            reason: self.reason.clone(),
            instructions: self.instructions.clone(),
            intervention_type: self.intervention_type,
            trigger: self.trigger,
            started_at: self.timestamp,
        }
    }
}

/// Messages carried by the shared, multiplexed event channel.
///
/// The channel also carries traffic for unrelated features; anything with an
/// unrecognised `type` lands in `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChannelMessage {
    #[serde(rename = "ai_navigation_step")]
    Step(NavigationStepEvent),
    #[serde(rename = "ai_navigation_complete")]
    Complete(NavigationCompleteEvent),
    #[serde(rename = "ai_navigation_intervention")]
    Intervention(InterventionEvent),
    #[serde(other)]
    Unknown,
}

impl ChannelMessage {
    pub fn navigation_id(&self) -> Option<&str> {
        match self {
            ChannelMessage::Step(e) => Some(&e.navigation_id),
            ChannelMessage::Complete(e) => Some(&e.navigation_id),
            ChannelMessage::Intervention(e) => Some(&e.navigation_id),
            ChannelMessage::Unknown => None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            ChannelMessage::Step(e) => Some(&e.session_id),
            ChannelMessage::Complete(e) => Some(&e.session_id),
            ChannelMessage::Intervention(e) => Some(&e.session_id),
            ChannelMessage::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartNavigationRequest {
    pub session_id: String,
    pub prompt: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartNavigationResponse {
    pub navigation_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub max_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

/// Body of a non-2xx response. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
