//! Command poller integration tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use convoyd::deploy::tracker::CommandTracker;
use convoyd::models::command::{CompletionStatus, HostCommand};
use convoyd::models::diagnostics::{DiagnosticsPayload, ScriptErrorCode};
use convoyd::storage::layout::StorageLayout;
use convoyd::workers::poller::{CommandPoller, RecoveryOutcome};
use convoyd::workers::pool::{PoolOptions, WorkerPool};

use common::{command, Call, FakeControlPlane, FakeExecutor, AGENT_HOST};

struct Fixture {
    client: Arc<FakeControlPlane>,
    executor: Arc<FakeExecutor>,
    tracker: CommandTracker,
    pool: Arc<WorkerPool>,
    poller: CommandPoller,
    _dir: tempfile::TempDir,
}

fn fixture(client: FakeControlPlane) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let tracker = CommandTracker::new(&StorageLayout::new(dir.path()));
    let client = Arc::new(client);
    let executor = Arc::new(FakeExecutor::new());
    let pool = Arc::new(WorkerPool::new(PoolOptions::default()));
    let poller = CommandPoller::new(
        client.clone(),
        executor.clone(),
        tracker.clone(),
        pool.clone(),
        AGENT_HOST.to_string(),
    );
    Fixture {
        client,
        executor,
        tracker,
        pool,
        poller,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_recovery_fails_tracked_command_before_any_poll() {
    let f = fixture(FakeControlPlane::new());
    f.tracker.write("d-9", "cmd-interrupted").await.unwrap();

    let outcome = f.poller.recover_from_crash().await;
    assert_eq!(outcome, RecoveryOutcome::Recovered);

    let completions = f.client.completions();
    assert_eq!(completions.len(), 1);
    let (id, status, payload) = &completions[0];
    assert_eq!(id, "cmd-interrupted");
    assert_eq!(*status, CompletionStatus::Failed);

    let payload: DiagnosticsPayload = serde_json::from_str(payload).unwrap();
    assert_eq!(
        payload.error_code,
        ScriptErrorCode::FailedAfterRestart.as_code()
    );

    // Record cleaned up, and no poll happened during recovery
    assert!(!f.tracker.exists().await);
    assert!(!f.client.calls().iter().any(|c| matches!(c, Call::Poll)));
}

#[tokio::test]
async fn test_recovery_without_record_is_clean() {
    let f = fixture(FakeControlPlane::new());

    let outcome = f.poller.recover_from_crash().await;
    assert_eq!(outcome, RecoveryOutcome::Clean);
    assert!(f.client.calls().is_empty());
}

#[tokio::test]
async fn test_recovery_failure_never_blocks_startup() {
    let mut client = FakeControlPlane::new();
    client.fail_completion = true;
    let f = fixture(client);
    f.tracker.write("d-9", "cmd-interrupted").await.unwrap();

    let outcome = f.poller.recover_from_crash().await;
    assert_eq!(outcome, RecoveryOutcome::Indeterminate);

    // The record survives for the next restart to retry
    assert!(f.tracker.exists().await);
}

#[tokio::test]
async fn test_tick_without_command_does_nothing() {
    let f = fixture(FakeControlPlane::new());

    f.poller.tick().await.unwrap();

    assert_eq!(f.client.calls().len(), 1);
    assert!(matches!(f.client.calls()[0], Call::Poll));
}

#[tokio::test]
async fn test_tick_rejects_host_mismatch_without_side_effects() {
    let client = FakeControlPlane::new();
    client.offer(HostCommand {
        host_identifier: "i-someone-else".to_string(),
        host_command_identifier: "cmd-1".to_string(),
        deployment_execution_id: "exec-1".to_string(),
        command_name: "ApplicationStart".to_string(),
    });
    let f = fixture(client);

    let result = f.poller.tick().await;
    assert!(result.is_err());

    // No acknowledgment or completion was attempted
    assert_eq!(f.client.calls().len(), 1);
    assert!(f.executor.executed().is_empty());
}

#[tokio::test]
async fn test_tick_rejects_empty_command_name_without_side_effects() {
    let client = FakeControlPlane::new();
    client.offer(command("cmd-1", ""));
    let f = fixture(client);

    let result = f.poller.tick().await;
    assert!(result.is_err());

    assert_eq!(f.client.calls().len(), 1);
    assert!(f.executor.executed().is_empty());
}

#[tokio::test]
async fn test_tick_runs_command_to_completion() {
    let client = FakeControlPlane::new();
    client.offer(command("cmd-1", "ApplicationStart"));
    let f = fixture(client);

    f.poller.tick().await.unwrap();

    // Drain the pool so the submitted lifecycle finishes
    f.pool.shutdown(Duration::from_secs(5)).await;

    assert_eq!(f.executor.executed(), vec!["cmd-1"]);
    let completions = f.client.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].1, CompletionStatus::Succeeded);
}

#[tokio::test]
async fn test_tick_drops_command_when_pool_is_shutting_down() {
    let client = FakeControlPlane::new();
    client.offer(command("cmd-1", "ApplicationStart"));
    let f = fixture(client);

    f.pool.shutdown(Duration::from_millis(10)).await;

    // The rejection is swallowed; the control plane will re-offer the command
    f.poller.tick().await.unwrap();

    assert!(f.executor.executed().is_empty());
    assert!(f.client.acknowledgements().is_empty());
    assert!(f.client.completions().is_empty());
}
