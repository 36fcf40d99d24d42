mod common;

use common::{setup_logging, Call, Fault, MockSession, REFERENCE_INSTRUCTION};
use courier::{
    ActionOutcome, ActionState, Courier, CourierError, Executor, ExecutorConfig, Plan,
    RunFailure, RunStatus,
};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

fn gmail_plan() -> Plan {
    Courier::new()
        .compile(REFERENCE_INSTRUCTION, "gmail")
        .expect("reference instruction compiles")
}

fn expected_calls() -> Vec<Call> {
    let s = |v: &str| v.to_string();
    vec![
        Call::ResolveControl(s("Compose")),
        Call::WaitVisible(s("Compose")),
        Call::Click(s("Compose")),
        Call::ResolveField(s("To")),
        Call::WaitVisible(s("To")),
        Call::SetValue(s("To"), s("joe@example.com")),
        Call::ResolveField(s("Subject")),
        Call::WaitVisible(s("Subject")),
        Call::SetValue(s("Subject"), s("Meeting")),
        Call::ResolveField(s("Message Body")),
        Call::WaitVisible(s("Message Body")),
        Call::SetValue(s("Message Body"), s("Hello from automation")),
        Call::ResolveControl(s("Send")),
        Call::WaitVisible(s("Send")),
        Call::Click(s("Send")),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_all_succeeding_session_completes_in_plan_order() {
    setup_logging();
    let mut session = MockSession::new();
    let outcome = Executor::default().execute(gmail_plan(), &mut session).await;

    assert!(outcome.is_completed(), "unexpected status {:?}", outcome.status);
    assert_eq!(session.calls(), expected_calls());
    assert!(!session.overlapped(), "session operations overlapped");
    assert_eq!(outcome.succeeded_count(), 5);
    assert!(outcome
        .actions
        .iter()
        .all(|r| r.state == ActionState::Settled && r.diagnostic.is_none()));
    // Default settle delay of 2s after each of the five actions
    assert!(outcome.duration_ms >= 10_000, "took {}ms", outcome.duration_ms);
    assert!(outcome.into_result().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_element_that_never_becomes_visible_times_out_and_stops_the_run() {
    setup_logging();
    let mut session = MockSession::new().with_fault("Subject", Fault::NeverVisible);
    let outcome = Executor::default().execute(gmail_plan(), &mut session).await;

    match &outcome.status {
        RunStatus::Failed {
            index: 2,
            failure: RunFailure::ResolutionTimeout { selector, timeout_ms },
        } => {
            assert_eq!(selector, "label:Subject");
            assert_eq!(*timeout_ms, 5_000);
        }
        other => panic!("Expected ResolutionTimeout at action 2, got {other:?}"),
    }

    let report = &outcome.actions[2];
    assert_eq!(report.state, ActionState::Failed);
    assert_eq!(
        report.outcome,
        Some(ActionOutcome::TimedOut("label:Subject".to_string()))
    );
    assert!(report.elapsed_ms >= 5_000);
    assert_eq!(
        outcome.diagnostic().map(|p| p.to_string_lossy().into_owned()),
        Some("diagnostics/gmail-action2-timeout.png".to_string())
    );

    // Nothing after the failing action was touched
    let calls = session.calls();
    assert_eq!(calls.last(), Some(&Call::Capture("gmail-action2-timeout".to_string())));
    assert!(!calls.iter().any(|c| matches!(c, Call::SetValue(label, _) if label == "Subject")));
    assert!(!calls
        .iter()
        .any(|c| matches!(c, Call::ResolveField(l) if l == "Message Body")));
    assert_eq!(session.count(&Call::ResolveControl("Send".to_string())), 0);
    assert_eq!(outcome.actions[3].state, ActionState::Pending);
    assert_eq!(outcome.actions[4].outcome, None);

    match outcome.into_result() {
        Err(CourierError::ResolutionTimeout {
            provider,
            index,
            selector,
            timeout,
        }) => {
            assert_eq!(provider, "gmail");
            assert_eq!(index, 2);
            assert_eq!(selector, "label:Subject");
            assert_eq!(timeout, Duration::from_secs(5));
        }
        other => panic!("Expected ResolutionTimeout error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_element_is_polled_until_the_deadline() {
    let mut session = MockSession::new().with_fault("To", Fault::NeverResolves);
    let executor = Executor::new(
        ExecutorConfig::default()
            .with_visibility_timeout(Duration::from_secs(1))
            .with_poll_interval(Duration::from_millis(100)),
    );
    let outcome = executor.execute(gmail_plan(), &mut session).await;

    assert!(matches!(
        outcome.status,
        RunStatus::Failed {
            index: 1,
            failure: RunFailure::ResolutionTimeout { .. }
        }
    ));
    let attempts = session.count(&Call::ResolveField("To".to_string()));
    assert!(attempts > 5, "only {attempts} resolution attempts");
    assert_eq!(session.count(&Call::WaitVisible("To".to_string())), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_rendering_is_absorbed_by_polling() {
    let mut session = MockSession::new()
        .with_fault("Compose", Fault::ResolvesAfter(Duration::from_millis(1_500)));
    let outcome = Executor::default().execute(gmail_plan(), &mut session).await;

    assert!(outcome.is_completed());
    assert!(outcome.actions[0].elapsed_ms >= 1_500);
    assert!(session.count(&Call::ResolveControl("Compose".to_string())) > 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_session_call_is_bounded_by_the_timeout() {
    let mut session = MockSession::new().with_fault("Compose", Fault::Hangs);
    let executor = Executor::new(
        ExecutorConfig::default().with_visibility_timeout(Duration::from_secs(1)),
    );
    let outcome = executor.execute(gmail_plan(), &mut session).await;

    assert!(matches!(
        outcome.status,
        RunStatus::Failed {
            index: 0,
            failure: RunFailure::ResolutionTimeout { .. }
        }
    ));
    assert!(outcome.actions[0].elapsed_ms >= 1_000);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_interaction_is_terminal() {
    let mut session = MockSession::new().with_fault("Send", Fault::InteractionFails);
    let outcome = Executor::default().execute(gmail_plan(), &mut session).await;

    match &outcome.status {
        RunStatus::Failed {
            index: 4,
            failure: RunFailure::InteractionFailed { selector, cause },
        } => {
            assert_eq!(selector, "role:button|name:Send");
            assert!(cause.contains("detached"), "cause: {cause}");
        }
        other => panic!("Expected InteractionFailed at action 4, got {other:?}"),
    }
    assert_eq!(session.count(&Call::Click("Send".to_string())), 1);
    assert_eq!(
        session.calls().last(),
        Some(&Call::Capture("gmail-action4-interaction".to_string()))
    );
    assert!(matches!(
        outcome.into_result(),
        Err(CourierError::InteractionFailed { index: 4, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_diagnostic_capture_does_not_mask_the_error() {
    let mut session = MockSession::new()
        .with_fault("Message Body", Fault::NeverVisible)
        .failing_captures();
    let outcome = Executor::default().execute(gmail_plan(), &mut session).await;

    assert!(matches!(
        outcome.status,
        RunStatus::Failed {
            index: 3,
            failure: RunFailure::ResolutionTimeout { .. }
        }
    ));
    assert_eq!(outcome.diagnostic(), None);
    assert_eq!(
        session.count(&Call::Capture("gmail-action3-timeout".to_string())),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_never_touches_the_session() {
    let mut session = MockSession::new();
    let token = CancellationToken::new();
    token.cancel();

    let outcome = Executor::default()
        .execute_with_cancel(gmail_plan(), &mut session, token)
        .await;

    match &outcome.status {
        RunStatus::Cancelled { index, reason } => {
            assert_eq!(*index, 0);
            assert_eq!(reason, "cancelled by caller");
        }
        other => panic!("Expected Cancelled, got {other:?}"),
    }
    assert!(session.calls().is_empty());
    assert!(matches!(
        outcome.into_result(),
        Err(CourierError::Cancelled(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_a_pending_wait() {
    let mut session = MockSession::new().with_fault("To", Fault::NeverVisible);
    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2_500)).await;
            token.cancel();
        })
    };

    let outcome = Executor::default()
        .execute_with_cancel(gmail_plan(), &mut session, token)
        .await;
    canceller.await.unwrap();

    match &outcome.status {
        RunStatus::Cancelled { index, reason } => {
            assert_eq!(*index, 1);
            assert!(reason.starts_with("cancelled by caller"), "reason: {reason}");
        }
        other => panic!("Expected Cancelled at action 1, got {other:?}"),
    }
    // Compose settled at 2s, the wait for "To" was cut short well before its 5s bound
    assert!(outcome.duration_ms < 3_000, "took {}ms", outcome.duration_ms);
    assert_eq!(outcome.actions[0].outcome, Some(ActionOutcome::Succeeded));
    assert!(!session
        .calls()
        .iter()
        .any(|c| matches!(c, Call::SetValue(..))));
}

#[tokio::test(start_paused = true)]
async fn test_run_deadline_cancels_a_stuck_run() {
    let mut session = MockSession::new().with_fault("To", Fault::NeverVisible);
    let executor = Executor::new(
        ExecutorConfig::default().with_run_timeout(Some(Duration::from_secs(3))),
    );
    let outcome = executor.execute(gmail_plan(), &mut session).await;

    match &outcome.status {
        RunStatus::Cancelled { index, reason } => {
            assert_eq!(*index, 1);
            assert!(reason.contains("deadline"), "reason: {reason}");
        }
        other => panic!("Expected Cancelled by deadline, got {other:?}"),
    }
    assert!(outcome.duration_ms >= 3_000 && outcome.duration_ms < 5_000);
}

#[tokio::test(start_paused = true)]
async fn test_independent_runs_can_proceed_in_parallel() {
    let executor = Executor::default();
    let mut first = MockSession::new();
    let mut second = MockSession::new().with_fault("Send", Fault::InteractionFails);

    let (a, b) = tokio::join!(
        executor.execute(gmail_plan(), &mut first),
        executor.execute(gmail_plan(), &mut second),
    );

    assert!(a.is_completed());
    assert!(!b.is_completed());
    assert_eq!(first.calls(), expected_calls());
    assert!(!first.overlapped() && !second.overlapped());
}
