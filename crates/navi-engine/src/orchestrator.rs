//! Single-session navigation orchestrator.
//!
//! Owns the one live [`NavigationSession`], issues start/abort/resume requests
//! through a [`NavigationApi`], and folds events from the shared channel into
//! session state. The correlation id is a plain field; every inbound event is
//! checked against it before anything else happens.

use crate::api::{ApiError, NavigationApi};
use crate::config::schema::NavigationConfig;
use crate::observer::{Observers, Subscription, SubscriptionId};
use navi_common::models::ModelRegistry;
use navi_common::protocol::{
    ChannelMessage, HumanInterventionState, NavigationStatus, NavigationStep,
    StartNavigationRequest, StartNavigationResponse,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("No browser session selected. Start a browser session first.")]
    MissingSession,

    #[error("A navigation is already in progress")]
    AlreadyInProgress,

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Navigation was reset before the start request completed")]
    Superseded,

    #[error("Failed to start navigation: {0}")]
    StartRejected(#[source] ApiError),

    #[error("Failed to abort navigation: {0}")]
    AbortRejected(#[source] ApiError),

    #[error("Failed to resume navigation: {0}")]
    ResumeRejected(#[source] ApiError),
}

/// The locally tracked view of one navigation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NavigationSession {
    pub navigation_id: Option<String>,
    pub session_id: String,
    pub prompt: String,
    pub model: String,
    pub max_steps: Option<u32>,
    pub steps: Vec<NavigationStep>,
    pub status: NavigationStatus,
    pub total_tokens: u64,
    pub error: Option<String>,
    pub human_intervention: Option<HumanInterventionState>,
}

impl NavigationSession {
    /// Cost of the steps received so far, priced from the model registry.
    pub fn estimated_cost(&self) -> Option<f64> {
        ModelRegistry::session_cost(&self.model, &self.steps)
    }
}

/// Folded view of `status`, the correlation id and the intervention side-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// Start request sent, no navigation id yet.
    Starting,
    Navigating,
    AwaitingHuman,
    Finished(NavigationStatus),
}

impl SessionPhase {
    pub fn can_abort(self) -> bool {
        match self {
            SessionPhase::Navigating | SessionPhase::AwaitingHuman => true,
            SessionPhase::Idle | SessionPhase::Starting | SessionPhase::Finished(_) => false,
        }
    }

    pub fn is_active(self) -> bool {
        match self {
            SessionPhase::Starting | SessionPhase::Navigating | SessionPhase::AwaitingHuman => true,
            SessionPhase::Idle | SessionPhase::Finished(_) => false,
        }
    }
}

/// What the orchestrator tells its subscribers after folding an event.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorNotice {
    Step {
        navigation_id: String,
        step: NavigationStep,
    },
    Complete {
        navigation_id: String,
        status: NavigationStatus,
        summary: Option<String>,
        error: Option<String>,
    },
    InterventionStarted {
        navigation_id: String,
        intervention: HumanInterventionState,
    },
    InterventionCleared {
        navigation_id: String,
    },
}

impl OrchestratorNotice {
    pub fn navigation_id(&self) -> &str {
        match self {
            OrchestratorNotice::Step { navigation_id, .. }
            | OrchestratorNotice::Complete { navigation_id, .. }
            | OrchestratorNotice::InterventionStarted { navigation_id, .. }
            | OrchestratorNotice::InterventionCleared { navigation_id } => navigation_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Hold events for our session that arrive before the start response.
    pub early_event_buffer: bool,
    pub early_event_capacity: usize,
    /// Local deadline armed when a start succeeds.
    pub deadline: Option<Duration>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            early_event_buffer: true,
            early_event_capacity: 64,
            deadline: None,
        }
    }
}

impl From<&NavigationConfig> for OrchestratorOptions {
    fn from(config: &NavigationConfig) -> Self {
        Self {
            early_event_buffer: config.early_event_buffer,
            early_event_capacity: config.early_event_capacity,
            deadline: config.deadline_ms.map(Duration::from_millis),
        }
    }
}

/// Token for a start request in flight. Produced by `begin_start`, consumed by
/// `finish_start`.
#[derive(Debug, Clone)]
pub struct PendingStart {
    generation: u64,
    pub request: StartNavigationRequest,
}

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub navigation_id: String,
    pub estimated_cost: Option<f64>,
    /// Notices produced by replaying events buffered during the start window.
    pub replayed: Vec<OrchestratorNotice>,
}

pub struct NavigationOrchestrator {
    api: Arc<dyn NavigationApi>,
    options: OrchestratorOptions,
    session_id: Option<String>,
    session: NavigationSession,
    early_events: VecDeque<ChannelMessage>,
    deadline: Option<Instant>,
    generation: u64,
    observers: Observers<OrchestratorNotice>,
}

impl NavigationOrchestrator {
    pub fn new(api: Arc<dyn NavigationApi>, options: OrchestratorOptions) -> Self {
        Self {
            api,
            options,
            session_id: None,
            session: NavigationSession::default(),
            early_events: VecDeque::new(),
            deadline: None,
            generation: 0,
            observers: Observers::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Changes the browser session used by the next start. Does not touch the
    /// current navigation; callers that switch sessions also `reset()`.
    pub fn set_session_id(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
    }

    pub fn session(&self) -> &NavigationSession {
        &self.session
    }

    pub fn navigation_id(&self) -> Option<&str> {
        self.session.navigation_id.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        match self.session.status {
            NavigationStatus::Idle => SessionPhase::Idle,
            NavigationStatus::Navigating => match (
                &self.session.navigation_id,
                &self.session.human_intervention,
            ) {
                (None, _) => SessionPhase::Starting,
                (Some(_), Some(_)) => SessionPhase::AwaitingHuman,
                (Some(_), None) => SessionPhase::Navigating,
            },
            terminal => SessionPhase::Finished(terminal),
        }
    }

    pub fn can_abort(&self) -> bool {
        self.phase().can_abort()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn subscribe(&mut self) -> Subscription<OrchestratorNotice> {
        self.observers.subscribe()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Validate preconditions and move to `navigating`.
    ///
    /// The returned token must be handed to [`finish_start`](Self::finish_start)
    /// together with the result of the start request.
    pub fn begin_start(
        &mut self,
        prompt: &str,
        model: &str,
        max_steps: Option<u32>,
    ) -> Result<PendingStart, NavigationError> {
        let Some(session_id) = self.session_id.clone() else {
            return Err(self.record(NavigationError::MissingSession));
        };
        if self.session.status == NavigationStatus::Navigating {
            return Err(self.record(NavigationError::AlreadyInProgress));
        }
        if !ModelRegistry::contains(model) {
            return Err(self.record(NavigationError::UnknownModel(model.to_string())));
        }

        self.generation += 1;
        self.early_events.clear();
        self.deadline = None;
        self.session = NavigationSession {
            navigation_id: None,
            session_id: session_id.clone(),
            prompt: prompt.to_string(),
            model: model.to_string(),
            max_steps,
            steps: Vec::new(),
            status: NavigationStatus::Navigating,
            total_tokens: 0,
            error: None,
            human_intervention: None,
        };

        info!(
            "Starting navigation for session {} (model={}, max_steps={:?})",
            session_id, model, max_steps
        );

        Ok(PendingStart {
            generation: self.generation,
            request: StartNavigationRequest {
                session_id,
                prompt: prompt.to_string(),
                model: model.to_string(),
                max_steps,
            },
        })
    }

    pub fn finish_start(
        &mut self,
        pending: PendingStart,
        result: Result<StartNavigationResponse, ApiError>,
    ) -> Result<StartOutcome, NavigationError> {
        if pending.generation != self.generation {
            warn!("Discarding start response for a navigation that was reset");
            return Err(NavigationError::Superseded);
        }

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Start navigation rejected: {}", e);
                self.early_events.clear();
                self.session.status = NavigationStatus::Failed;
                self.session.error = Some(e.to_string());
                return Err(NavigationError::StartRejected(e));
            }
        };

        let navigation_id = response.navigation_id.clone();
        info!("Navigation {} started", navigation_id);
        self.session.navigation_id = Some(navigation_id.clone());
        self.deadline = self.options.deadline.map(|d| Instant::now() + d);

        let buffered: Vec<ChannelMessage> = self.early_events.drain(..).collect();
        let mut replayed = Vec::new();
        for msg in buffered {
            if msg.navigation_id() != Some(navigation_id.as_str()) {
                continue;
            }
            if let Some(notice) = self.ingest(&msg) {
                replayed.push(notice);
            }
        }
        if !replayed.is_empty() {
            debug!(
                "Replayed {} early event(s) for navigation {}",
                replayed.len(),
                navigation_id
            );
        }

        Ok(StartOutcome {
            navigation_id,
            estimated_cost: response.estimated_cost,
            replayed,
        })
    }

    /// Start a navigation and wait for the server to hand back its id.
    pub async fn start_navigation(
        &mut self,
        prompt: &str,
        model: &str,
        max_steps: Option<u32>,
    ) -> Result<StartOutcome, NavigationError> {
        let pending = self.begin_start(prompt, model, max_steps)?;
        let result = self.api.start(&pending.request).await;
        self.finish_start(pending, result)
    }

    /// Fold one message from the shared channel into session state.
    ///
    /// Returns the notice that was delivered to subscribers, or `None` when
    /// the message was foreign, stale or buffered.
    pub fn ingest(&mut self, msg: &ChannelMessage) -> Option<OrchestratorNotice> {
        let event_id = msg.navigation_id()?;

        match self.session.navigation_id.as_deref() {
            Some(current) if current == event_id => {}
            None if self.accepts_early(msg) => {
                if self.early_events.len() >= self.options.early_event_capacity {
                    self.early_events.pop_front();
                    debug!("Early event buffer full, dropped oldest");
                }
                trace!("Buffering early event for navigation {}", event_id);
                self.early_events.push_back(msg.clone());
                return None;
            }
            _ => {
                trace!("Ignoring event for navigation {}", event_id);
                return None;
            }
        }

        let notice = self.apply(msg)?;
        self.observers.emit(&notice);
        Some(notice)
    }

    fn accepts_early(&self, msg: &ChannelMessage) -> bool {
        self.options.early_event_buffer
            && self.options.early_event_capacity > 0
            && self.phase() == SessionPhase::Starting
            && msg.session_id() == Some(self.session.session_id.as_str())
    }

    fn apply(&mut self, msg: &ChannelMessage) -> Option<OrchestratorNotice> {
        match msg {
            ChannelMessage::Step(event) => {
                let step = NavigationStep::from(event);
                self.session.total_tokens = self
                    .session
                    .total_tokens
                    .saturating_add(event.tokens_used.total_tokens);
                self.session.steps.push(step.clone());
                Some(OrchestratorNotice::Step {
                    navigation_id: event.navigation_id.clone(),
                    step,
                })
            }
            ChannelMessage::Complete(event) => {
                let (status, error) = if event.status.is_terminal() {
                    (event.status, event.error.clone())
                } else {
                    warn!(
                        "Navigation {} completed with non-terminal status {}",
                        event.navigation_id, event.status
                    );
                    let reason = format!(
                        "Completion reported non-terminal status {}",
                        event.status
                    );
                    (
                        NavigationStatus::Failed,
                        Some(event.error.clone().unwrap_or(reason)),
                    )
                };
                info!(
                    "Navigation {} finished: {} ({} steps, {} tokens)",
                    event.navigation_id, status, event.total_steps, event.total_tokens
                );
                self.session.status = status;
                self.session.total_tokens = event.total_tokens;
                if let Some(err) = &error {
                    self.session.error = Some(err.clone());
                }
                self.session.human_intervention = None;
                self.session.navigation_id = None;
                self.deadline = None;
                Some(OrchestratorNotice::Complete {
                    navigation_id: event.navigation_id.clone(),
                    status,
                    summary: event.summary.clone(),
                    error,
                })
            }
            ChannelMessage::Intervention(event) => {
                info!(
                    "Navigation {} awaiting human: {}",
                    event.navigation_id, event.reason
                );
                let intervention = event.to_state();
                self.session.human_intervention = Some(intervention.clone());
                Some(OrchestratorNotice::InterventionStarted {
                    navigation_id: event.navigation_id.clone(),
                    intervention,
                })
            }
            ChannelMessage::Unknown => None,
        }
    }

    /// Pause the current navigation for a human, e.g. after local CAPTCHA
    /// detection. No-op without a navigation id.
    pub fn begin_intervention(
        &mut self,
        intervention: HumanInterventionState,
    ) -> Option<OrchestratorNotice> {
        let navigation_id = self.session.navigation_id.clone()?;
        info!(
            "Navigation {} awaiting human: {}",
            navigation_id, intervention.reason
        );
        self.session.human_intervention = Some(intervention.clone());
        let notice = OrchestratorNotice::InterventionStarted {
            navigation_id,
            intervention,
        };
        self.observers.emit(&notice);
        Some(notice)
    }

    /// Tell the server to continue after a human intervention.
    ///
    /// The intervention is cleared only once the server accepts the resume.
    pub async fn resume_navigation(
        &mut self,
    ) -> Result<Option<OrchestratorNotice>, NavigationError> {
        let Some(navigation_id) = self.session.navigation_id.clone() else {
            return Ok(None);
        };

        if let Err(e) = self.api.resume(&navigation_id).await {
            warn!("Resume for navigation {} rejected: {}", navigation_id, e);
            self.session.error = Some(e.to_string());
            return Err(NavigationError::ResumeRejected(e));
        }

        info!("Navigation {} resumed", navigation_id);
        if self.session.human_intervention.take().is_none() {
            return Ok(None);
        }
        let notice = OrchestratorNotice::InterventionCleared { navigation_id };
        self.observers.emit(&notice);
        Ok(Some(notice))
    }

    /// Ask the server to stop. Status flips to `aborted` optimistically; a
    /// later completion event still overwrites it.
    pub async fn abort_navigation(&mut self) -> Result<(), NavigationError> {
        let Some(navigation_id) = self.session.navigation_id.clone() else {
            return Ok(());
        };

        match self.api.abort(&navigation_id).await {
            Ok(()) => {
                info!("Abort requested for navigation {}", navigation_id);
                self.session.status = NavigationStatus::Aborted;
                self.deadline = None;
                Ok(())
            }
            Err(e) => {
                warn!("Abort for navigation {} rejected: {}", navigation_id, e);
                self.session.error = Some(e.to_string());
                Err(NavigationError::AbortRejected(e))
            }
        }
    }

    /// Forget the local view. Never contacts the server.
    pub fn reset(&mut self) {
        if let Some(id) = &self.session.navigation_id {
            warn!(
                "Resetting while navigation {} is still tracked; the server run is not aborted",
                id
            );
        }
        self.generation += 1;
        self.session = NavigationSession::default();
        self.early_events.clear();
        self.deadline = None;
    }

    /// Fail the navigation locally once its deadline has passed.
    pub fn check_deadline(&mut self, now: Instant) -> Option<OrchestratorNotice> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;

        let navigation_id = self.session.navigation_id.take()?;
        let limit = self.options.deadline.unwrap_or_default();
        let error = format!("Navigation timed out after {} ms", limit.as_millis());
        warn!("Navigation {}: {}", navigation_id, error);

        self.session.status = NavigationStatus::Failed;
        self.session.error = Some(error.clone());
        self.session.human_intervention = None;

        let notice = OrchestratorNotice::Complete {
            navigation_id,
            status: NavigationStatus::Failed,
            summary: None,
            error: Some(error),
        };
        self.observers.emit(&notice);
        Some(notice)
    }

    fn record(&mut self, err: NavigationError) -> NavigationError {
        self.session.error = Some(err.to_string());
        err
    }
}
