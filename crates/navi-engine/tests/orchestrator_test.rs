mod common;

use chrono::Utc;
use common::{Call, MODEL, MockApi, SESSION, complete, intervention, orchestrator, step, step_for};
use navi_engine::api::ApiError;
use navi_engine::orchestrator::{
    NavigationError, NavigationOrchestrator, NavigationSession, OrchestratorNotice,
    OrchestratorOptions, SessionPhase,
};
use navi_engine::protocol::{
    HumanInterventionState, InterventionTrigger, InterventionType, NavigationStatus,
    StartNavigationResponse,
};
use std::time::Duration;
use tokio::time::Instant;

fn response(navigation_id: &str) -> StartNavigationResponse {
    StartNavigationResponse {
        navigation_id: navigation_id.to_string(),
        status: "navigating".into(),
        model: MODEL.into(),
        max_steps: Some(10),
        estimated_cost: None,
    }
}

#[tokio::test]
async fn test_start_requires_session() {
    let api = MockApi::new();
    let mut orch = NavigationOrchestrator::new(api.clone(), OrchestratorOptions::default());

    let err = orch.start_navigation("Go to login", MODEL, Some(10)).await;

    assert!(matches!(err, Err(NavigationError::MissingSession)));
    assert_eq!(orch.session().status, NavigationStatus::Idle);
    assert!(orch.session().error.is_some());
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_start_success_records_navigation_id() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);

    let outcome = orch
        .start_navigation("Go to login", MODEL, Some(10))
        .await
        .unwrap();

    assert_eq!(outcome.navigation_id, "nav-1");
    assert_eq!(outcome.estimated_cost, Some(0.05));
    assert_eq!(orch.navigation_id(), Some("nav-1"));
    assert_eq!(orch.session().status, NavigationStatus::Navigating);
    assert_eq!(orch.session().session_id, SESSION);
    assert_eq!(orch.phase(), SessionPhase::Navigating);
    assert!(orch.can_abort());

    match &api.calls()[0] {
        Call::Start(req) => {
            assert_eq!(req.session_id, SESSION);
            assert_eq!(req.prompt, "Go to login");
            assert_eq!(req.model, MODEL);
            assert_eq!(req.max_steps, Some(10));
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_start_while_navigating_is_refused_without_transition() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("first", MODEL, None).await.unwrap();
    orch.ingest(&step("nav-1", 1, 100));

    let err = orch.start_navigation("second", MODEL, None).await;

    assert!(matches!(err, Err(NavigationError::AlreadyInProgress)));
    assert_eq!(api.start_calls(), 1);
    assert_eq!(orch.navigation_id(), Some("nav-1"));
    assert_eq!(orch.session().prompt, "first");
    assert_eq!(orch.session().steps.len(), 1);
    assert_eq!(
        orch.session().error.as_deref(),
        Some("A navigation is already in progress")
    );
}

#[tokio::test]
async fn test_start_rejects_unknown_model() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);

    let err = orch.start_navigation("Go", "gpt-2", None).await;

    assert!(matches!(err, Err(NavigationError::UnknownModel(m)) if m == "gpt-2"));
    assert_eq!(orch.session().status, NavigationStatus::Idle);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_start_rejected_marks_failed() {
    let api = MockApi::new();
    api.fail_start_with("Browser session not found");
    let mut orch = orchestrator(&api);

    let err = orch.start_navigation("Go", MODEL, None).await;

    assert!(matches!(err, Err(NavigationError::StartRejected(_))));
    assert_eq!(orch.session().status, NavigationStatus::Failed);
    assert_eq!(
        orch.session().error.as_deref(),
        Some("Browser session not found")
    );
    assert!(orch.navigation_id().is_none());
    assert_eq!(orch.phase(), SessionPhase::Finished(NavigationStatus::Failed));
}

#[tokio::test]
async fn test_new_start_clears_previous_run() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("first", MODEL, None).await.unwrap();
    orch.ingest(&step("nav-1", 1, 100));
    orch.ingest(&complete("nav-1", NavigationStatus::Failed, 100, None));

    orch.start_navigation("second", MODEL, None).await.unwrap();

    let session = orch.session();
    assert_eq!(session.navigation_id.as_deref(), Some("nav-2"));
    assert!(session.steps.is_empty());
    assert_eq!(session.total_tokens, 0);
    assert!(session.error.is_none());
}

#[tokio::test]
async fn test_foreign_and_stale_events_change_nothing() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();
    orch.ingest(&step("nav-1", 1, 100));
    let mut sub = orch.subscribe();
    let before = orch.session().clone();

    assert!(orch.ingest(&step("nav-0", 2, 100)).is_none());
    assert!(
        orch.ingest(&complete("nav-0", NavigationStatus::Completed, 5, None))
            .is_none()
    );
    assert!(orch.ingest(&intervention("nav-0", "CAPTCHA")).is_none());

    assert_eq!(orch.session(), &before);
    assert!(sub.drain().is_empty());
}

#[tokio::test]
async fn test_token_accumulation_then_authoritative_total() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    let mut totals = Vec::new();
    for (n, tokens) in [100, 150, 50].into_iter().enumerate() {
        orch.ingest(&step("nav-1", n as u32 + 1, tokens));
        totals.push(orch.session().total_tokens);
    }
    assert_eq!(totals, vec![100, 250, 300]);

    orch.ingest(&complete("nav-1", NavigationStatus::Completed, 999, None));
    assert_eq!(orch.session().total_tokens, 999);
    assert_eq!(orch.session().status, NavigationStatus::Completed);
}

#[tokio::test]
async fn test_steps_grow_monotonically_and_reset_clears() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    let mut last = 0;
    for n in 1..=5 {
        orch.ingest(&step("nav-1", n, 10));
        let len = orch.session().steps.len();
        assert!(len > last);
        last = len;
    }
    let numbers: Vec<u32> = orch.session().steps.iter().map(|s| s.step_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

    orch.reset();
    assert!(orch.session().steps.is_empty());
}

#[tokio::test]
async fn test_reset_is_idempotent_and_local() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();
    orch.ingest(&step("nav-1", 1, 10));

    orch.reset();
    let once = orch.session().clone();
    orch.reset();

    assert_eq!(orch.session(), &once);
    assert_eq!(orch.session(), &NavigationSession::default());
    assert_eq!(orch.phase(), SessionPhase::Idle);
    assert_eq!(orch.session_id(), Some(SESSION));
    // No abort is sent on reset.
    assert_eq!(api.calls().len(), 1);

    // Events from the forgotten navigation are now stale.
    assert!(orch.ingest(&step("nav-1", 2, 10)).is_none());
}

#[tokio::test]
async fn test_abort_race_completion_wins() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    orch.abort_navigation().await.unwrap();
    assert_eq!(orch.session().status, NavigationStatus::Aborted);
    assert!(!orch.can_abort());

    orch.ingest(&complete("nav-1", NavigationStatus::Completed, 300, Some("Done")));
    assert_eq!(orch.session().status, NavigationStatus::Completed);
    assert_eq!(api.calls()[1], Call::Abort("nav-1".into()));
}

#[tokio::test]
async fn test_abort_rejected_keeps_navigating() {
    let api = MockApi::new();
    api.fail_abort_with("Navigation not found");
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    let err = orch.abort_navigation().await;

    assert!(matches!(err, Err(NavigationError::AbortRejected(_))));
    assert_eq!(orch.session().status, NavigationStatus::Navigating);
    assert_eq!(orch.session().error.as_deref(), Some("Navigation not found"));
    assert!(orch.can_abort());
}

#[tokio::test]
async fn test_abort_without_navigation_is_noop() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);

    orch.abort_navigation().await.unwrap();

    assert!(api.calls().is_empty());
    assert_eq!(orch.session().status, NavigationStatus::Idle);
}

#[tokio::test]
async fn test_completion_closes_correlation() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    let notice = orch.ingest(&complete(
        "nav-1",
        NavigationStatus::LoopDetected,
        40,
        Some("Kept clicking the same button"),
    ));

    assert_eq!(
        notice,
        Some(OrchestratorNotice::Complete {
            navigation_id: "nav-1".into(),
            status: NavigationStatus::LoopDetected,
            summary: Some("Kept clicking the same button".into()),
            error: None,
        })
    );
    assert!(orch.navigation_id().is_none());
    assert!(orch.ingest(&step("nav-1", 9, 10)).is_none());
    assert!(orch.session().steps.is_empty());
}

#[tokio::test]
async fn test_intervention_event_enters_awaiting_human() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    orch.ingest(&intervention("nav-1", "CAPTCHA detected"));

    assert_eq!(orch.session().status, NavigationStatus::Navigating);
    assert_eq!(orch.phase(), SessionPhase::AwaitingHuman);
    assert!(orch.can_abort());
    let state = orch.session().human_intervention.as_ref().unwrap();
    assert_eq!(state.reason, "CAPTCHA detected");

    let notice = orch.resume_navigation().await.unwrap();
    assert_eq!(
        notice,
        Some(OrchestratorNotice::InterventionCleared {
            navigation_id: "nav-1".into()
        })
    );
    assert!(orch.session().human_intervention.is_none());
    assert_eq!(orch.phase(), SessionPhase::Navigating);
    assert_eq!(api.calls()[1], Call::Resume("nav-1".into()));
}

#[tokio::test]
async fn test_programmatic_intervention_and_failed_resume() {
    let api = MockApi::new();
    api.fail_resume_with("Navigation is not paused");
    let mut orch = orchestrator(&api);

    let state = HumanInterventionState {
        reason: "Login required".into(),
        instructions: None,
        intervention_type: InterventionType::LoginRequired,
        trigger: InterventionTrigger::AiRequested,
        started_at: Utc::now(),
    };
    assert!(orch.begin_intervention(state.clone()).is_none());

    orch.start_navigation("Go", MODEL, None).await.unwrap();
    assert!(orch.begin_intervention(state).is_some());

    let err = orch.resume_navigation().await;
    assert!(matches!(err, Err(NavigationError::ResumeRejected(_))));
    assert_eq!(orch.phase(), SessionPhase::AwaitingHuman);
    assert_eq!(
        orch.session().error.as_deref(),
        Some("Navigation is not paused")
    );
}

#[tokio::test]
async fn test_resume_without_navigation_is_noop() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);

    assert_eq!(orch.resume_navigation().await.unwrap(), None);
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_early_events_replayed_after_start() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);

    let pending = orch.begin_start("Go", MODEL, None).unwrap();
    assert_eq!(orch.phase(), SessionPhase::Starting);
    assert!(!orch.can_abort());

    // Arrives before the start response resolves.
    assert!(orch.ingest(&step("nav-7", 1, 120)).is_none());
    // Other browser session on the shared channel.
    assert!(orch.ingest(&step_for("nav-8", "sess-2", 1, 50)).is_none());
    assert!(orch.session().steps.is_empty());

    let outcome = orch.finish_start(pending, Ok(response("nav-7"))).unwrap();

    assert_eq!(outcome.replayed.len(), 1);
    assert_eq!(orch.session().steps.len(), 1);
    assert_eq!(orch.session().total_tokens, 120);
}

#[tokio::test]
async fn test_early_events_dropped_when_buffer_disabled() {
    let api = MockApi::new();
    let options = OrchestratorOptions {
        early_event_buffer: false,
        ..OrchestratorOptions::default()
    };
    let mut orch = NavigationOrchestrator::new(api.clone(), options).with_session(SESSION);

    let pending = orch.begin_start("Go", MODEL, None).unwrap();
    orch.ingest(&step("nav-7", 1, 120));
    let outcome = orch.finish_start(pending, Ok(response("nav-7"))).unwrap();

    assert!(outcome.replayed.is_empty());
    assert!(orch.session().steps.is_empty());
}

#[tokio::test]
async fn test_start_response_after_reset_is_discarded() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);

    let pending = orch.begin_start("Go", MODEL, None).unwrap();
    orch.reset();
    let err = orch.finish_start(pending, Ok(response("nav-7")));

    assert!(matches!(err, Err(NavigationError::Superseded)));
    assert!(orch.navigation_id().is_none());
    assert_eq!(orch.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_failed_start_discards_buffer() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);

    let pending = orch.begin_start("Go", MODEL, None).unwrap();
    orch.ingest(&step("nav-7", 1, 120));
    let result = orch.finish_start(
        pending,
        Err(ApiError::Rejected {
            status: 503,
            message: "Request failed with status 503".into(),
        }),
    );

    assert!(matches!(result, Err(NavigationError::StartRejected(_))));
    assert_eq!(orch.session().status, NavigationStatus::Failed);
    assert!(orch.session().steps.is_empty());
}

#[tokio::test]
async fn test_deadline_synthesizes_local_failure() {
    let api = MockApi::new();
    let options = OrchestratorOptions {
        deadline: Some(Duration::from_millis(50)),
        ..OrchestratorOptions::default()
    };
    let mut orch = NavigationOrchestrator::new(api.clone(), options).with_session(SESSION);
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    let deadline = orch.deadline().unwrap();
    assert!(orch.check_deadline(deadline - Duration::from_millis(10)).is_none());

    let notice = orch.check_deadline(deadline).unwrap();

    assert!(matches!(
        notice,
        OrchestratorNotice::Complete { status: NavigationStatus::Failed, .. }
    ));
    assert_eq!(orch.session().status, NavigationStatus::Failed);
    assert_eq!(
        orch.session().error.as_deref(),
        Some("Navigation timed out after 50 ms")
    );
    assert!(orch.navigation_id().is_none());
    assert!(orch.deadline().is_none());
    assert!(orch.check_deadline(Instant::now()).is_none());
}

#[tokio::test]
async fn test_no_deadline_by_default() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    assert!(orch.deadline().is_none());
    assert!(
        orch.check_deadline(Instant::now() + Duration::from_secs(3600))
            .is_none()
    );
    assert_eq!(orch.session().status, NavigationStatus::Navigating);
}

#[tokio::test]
async fn test_subscribers_receive_notices_until_unsubscribed() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    let mut sub = orch.subscribe();
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    orch.ingest(&step("nav-1", 1, 10));
    let received = sub.drain();
    assert_eq!(received.len(), 1);
    assert!(matches!(&received[0], OrchestratorNotice::Step { step, .. } if step.step_number == 1));

    assert!(orch.unsubscribe(sub.id()));
    orch.ingest(&step("nav-1", 2, 10));
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn test_estimated_cost_from_steps() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();
    orch.ingest(&step("nav-1", 1, 400_000));

    // 200k prompt @ $2.50/M + 100k completion @ $10/M
    let cost = orch.session().estimated_cost().unwrap();
    assert!((cost - 1.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_non_terminal_completion_folds_to_failed() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    let notice = orch.ingest(&complete("nav-1", NavigationStatus::Navigating, 10, None));

    assert!(matches!(
        notice,
        Some(OrchestratorNotice::Complete { status: NavigationStatus::Failed, .. })
    ));
    assert_eq!(orch.phase(), SessionPhase::Finished(NavigationStatus::Failed));
    assert!(!orch.phase().is_active());
    assert!(orch.navigation_id().is_none());
    assert_eq!(
        orch.session().error.as_deref(),
        Some("Completion reported non-terminal status navigating")
    );

    let next = orch.start_navigation("Again", MODEL, None).await.unwrap();
    assert_eq!(next.navigation_id, "nav-2");
}

#[tokio::test]
async fn test_token_total_saturates() {
    let api = MockApi::new();
    let mut orch = orchestrator(&api);
    orch.start_navigation("Go", MODEL, None).await.unwrap();

    orch.ingest(&step("nav-1", 1, u64::MAX / 2 + 1));
    orch.ingest(&step("nav-1", 2, u64::MAX / 2 + 1));

    assert_eq!(orch.session().total_tokens, u64::MAX);
    assert_eq!(orch.session().steps.len(), 2);
}
