#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use navi_engine::api::{ApiError, NavigationApi};
use navi_engine::orchestrator::{NavigationOrchestrator, OrchestratorOptions};
use navi_engine::protocol::{
    BrowserAction, ChannelMessage, ClickAction, InterventionEvent, InterventionTrigger,
    InterventionType, NavigationCompleteEvent, NavigationStatus, NavigationStepEvent,
    StartNavigationRequest, StartNavigationResponse, TokenUsage,
};
use std::sync::{Arc, Mutex};

pub const SESSION: &str = "sess-1";
pub const MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start(StartNavigationRequest),
    Abort(String),
    Resume(String),
}

/// Records every call; start hands out `nav-1`, `nav-2`, ... in order.
#[derive(Debug, Default)]
pub struct MockApi {
    pub calls: Mutex<Vec<Call>>,
    pub fail_start: Mutex<Option<String>>,
    pub fail_abort: Mutex<Option<String>>,
    pub fail_resume: Mutex<Option<String>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn start_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Start(_)))
            .count()
    }

    pub fn fail_start_with(&self, message: &str) {
        *self.fail_start.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_abort_with(&self, message: &str) {
        *self.fail_abort.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_resume_with(&self, message: &str) {
        *self.fail_resume.lock().unwrap() = Some(message.to_string());
    }
}

fn rejected(message: &str) -> ApiError {
    ApiError::Rejected {
        status: 400,
        message: message.to_string(),
    }
}

#[async_trait]
impl NavigationApi for MockApi {
    async fn start(
        &self,
        request: &StartNavigationRequest,
    ) -> Result<StartNavigationResponse, ApiError> {
        self.calls.lock().unwrap().push(Call::Start(request.clone()));
        if let Some(msg) = self.fail_start.lock().unwrap().as_deref() {
            return Err(rejected(msg));
        }
        Ok(StartNavigationResponse {
            navigation_id: format!("nav-{}", self.start_calls()),
            status: "navigating".into(),
            model: request.model.clone(),
            max_steps: request.max_steps,
            estimated_cost: Some(0.05),
        })
    }

    async fn abort(&self, navigation_id: &str) -> Result<(), ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Abort(navigation_id.to_string()));
        match self.fail_abort.lock().unwrap().as_deref() {
            Some(msg) => Err(rejected(msg)),
            None => Ok(()),
        }
    }

    async fn resume(&self, navigation_id: &str) -> Result<(), ApiError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Resume(navigation_id.to_string()));
        match self.fail_resume.lock().unwrap().as_deref() {
            Some(msg) => Err(rejected(msg)),
            None => Ok(()),
        }
    }
}

pub fn orchestrator(api: &Arc<MockApi>) -> NavigationOrchestrator {
    NavigationOrchestrator::new(api.clone(), OrchestratorOptions::default()).with_session(SESSION)
}

pub fn step(navigation_id: &str, step_number: u32, total_tokens: u64) -> ChannelMessage {
    step_for(navigation_id, SESSION, step_number, total_tokens)
}

pub fn step_for(
    navigation_id: &str,
    session_id: &str,
    step_number: u32,
    total_tokens: u64,
) -> ChannelMessage {
    ChannelMessage::Step(NavigationStepEvent {
        navigation_id: navigation_id.to_string(),
        session_id: session_id.to_string(),
        step_number,
        action: BrowserAction::Click(ClickAction {
            element_id: Some(5),
            coordinates: None,
        }),
        reasoning: "The login link is visible".to_string(),
        current_url: "https://example.com".to_string(),
        goal_achieved: false,
        tokens_used: TokenUsage {
            prompt_tokens: total_tokens / 2,
            completion_tokens: total_tokens / 4,
            total_tokens,
        },
        duration_ms: 500,
        error: None,
        timestamp: Utc::now(),
    })
}

pub fn complete(
    navigation_id: &str,
    status: NavigationStatus,
    total_tokens: u64,
    summary: Option<&str>,
) -> ChannelMessage {
    ChannelMessage::Complete(NavigationCompleteEvent {
        navigation_id: navigation_id.to_string(),
        session_id: SESSION.to_string(),
        status,
        total_steps: 1,
        total_tokens,
        total_duration_ms: 1500,
        final_url: "https://example.com/login".to_string(),
        error: None,
        summary: summary.map(str::to_string),
        timestamp: Utc::now(),
    })
}

pub fn intervention(navigation_id: &str, reason: &str) -> ChannelMessage {
    ChannelMessage::Intervention(InterventionEvent {
        navigation_id: navigation_id.to_string(),
        session_id: SESSION.to_string(),
        reason: reason.to_string(),
        instructions: Some("Solve the CAPTCHA in the browser window".to_string()),
        intervention_type: InterventionType::Captcha,
        trigger: InterventionTrigger::Programmatic,
        timestamp: Utc::now(),
    })
}
