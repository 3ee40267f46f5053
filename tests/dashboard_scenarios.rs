//! End-to-end dashboard scenarios against a gated transport.
//!
//! Every send parks on a oneshot until the test releases it, so the order in
//! which server answers arrive is fully controlled.

use std::sync::{Arc, Mutex};

use stratdash::dashboard::Dashboard;
use stratdash::error::DashboardError;
use stratdash::registry::{RowId, RowPayload};
use stratdash::state::Config;
use stratdash::transport::CommandTransport;
use stratdash::verify::row_sm::{Command, LifecycleState};
use tokio::sync::oneshot;

struct Gate {
    row_id: RowId,
    command: Command,
    answer: oneshot::Sender<bool>,
}

#[derive(Clone, Default)]
struct GatedTransport {
    gates: Arc<Mutex<Vec<Gate>>>,
    calls: Arc<Mutex<usize>>,
}

impl GatedTransport {
    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    async fn wait_for_calls(&self, n: usize) {
        for _ in 0..1000 {
            if self.calls() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {} transport calls, saw {}", n, self.calls());
    }

    fn release(&self, row_id: RowId, ok: bool) -> Command {
        let mut gates = self.gates.lock().unwrap();
        let idx = gates
            .iter()
            .position(|g| g.row_id == row_id)
            .unwrap_or_else(|| panic!("no pending call for row {}", row_id));
        let gate = gates.remove(idx);
        let _ = gate.answer.send(ok);
        gate.command
    }
}

#[async_trait::async_trait]
impl CommandTransport for GatedTransport {
    async fn send(&self, command: Command, payload: &RowPayload) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push(Gate { row_id: payload.id, command, answer: tx });
        *self.calls.lock().unwrap() += 1;
        match rx.await {
            Ok(true) => Ok(()),
            Ok(false) => Err(anyhow::anyhow!("POST /strategy/{} returned 500", command)),
            Err(_) => Err(anyhow::anyhow!("gate dropped")),
        }
    }
}

fn setup(cfg: Config) -> (GatedTransport, Dashboard) {
    let transport = GatedTransport::default();
    let dashboard = Dashboard::new(Arc::new(transport.clone()), &cfg);
    (transport, dashboard)
}

fn no_timeout() -> Config {
    Config { command_timeout_ms: 0, ..Default::default() }
}

fn state_of(d: &Dashboard, id: RowId) -> LifecycleState {
    d.row(id).unwrap().lifecycle_state
}

#[tokio::test]
async fn start_then_failed_stop_reverts_to_running() {
    let (t, mut d) = setup(no_timeout());

    let row = d.on_add_row().unwrap();
    assert_eq!(row.id, 1);
    assert_eq!(row.lifecycle_state, LifecycleState::Stopped);

    let optimistic = d.on_command(1, Command::Start).unwrap();
    assert_eq!(optimistic.lifecycle_state, LifecycleState::Starting);
    t.wait_for_calls(1).await;

    let err = d.on_command(1, Command::Start).unwrap_err();
    assert_eq!(err, DashboardError::CommandInProgress { id: 1 });
    tokio::task::yield_now().await;
    assert_eq!(t.calls(), 1);
    assert_eq!(state_of(&d, 1), LifecycleState::Starting);

    assert_eq!(t.release(1, true), Command::Start);
    let done = d.next_outcome().await.unwrap();
    assert!(done.outcome.is_success());
    assert_eq!(state_of(&d, 1), LifecycleState::Running);

    d.on_command(1, Command::Stop).unwrap();
    assert_eq!(state_of(&d, 1), LifecycleState::Stopping);
    t.wait_for_calls(2).await;
    t.release(1, false);
    d.next_outcome().await.unwrap();

    let row = d.row(1).unwrap();
    assert_eq!(row.lifecycle_state, LifecycleState::Running);
    assert!(row.last_error.as_deref().unwrap().contains("500"));
    assert!(!d.is_in_flight(1));
}

#[tokio::test]
async fn retry_after_failure_clears_error() {
    let (t, mut d) = setup(no_timeout());
    d.on_add_row().unwrap();

    d.on_command(1, Command::Start).unwrap();
    t.wait_for_calls(1).await;
    t.release(1, false);
    d.next_outcome().await.unwrap();
    assert_eq!(state_of(&d, 1), LifecycleState::Stopped);
    assert!(d.row(1).unwrap().last_error.is_some());

    d.on_command(1, Command::Start).unwrap();
    t.wait_for_calls(2).await;
    t.release(1, true);
    d.next_outcome().await.unwrap();
    let row = d.row(1).unwrap();
    assert_eq!(row.lifecycle_state, LifecycleState::Running);
    assert!(row.last_error.is_none());
}

#[tokio::test]
async fn rows_complete_independently_in_any_order() {
    for second_first in [true, false] {
        let (t, mut d) = setup(no_timeout());
        d.on_add_row().unwrap();
        d.on_add_row().unwrap();

        d.on_command(1, Command::Start).unwrap();
        d.on_command(2, Command::Start).unwrap();
        t.wait_for_calls(2).await;

        let order: [(RowId, bool); 2] = if second_first {
            [(2, false), (1, true)]
        } else {
            [(1, true), (2, false)]
        };
        for (id, ok) in order {
            t.release(id, ok);
            let done = d.next_outcome().await.unwrap();
            assert_eq!(done.outcome.row_id, id);
        }

        assert_eq!(state_of(&d, 1), LifecycleState::Running);
        assert!(d.row(1).unwrap().last_error.is_none());
        assert_eq!(state_of(&d, 2), LifecycleState::Stopped);
        assert!(d.row(2).unwrap().last_error.is_some());
    }
}

#[tokio::test]
async fn pause_then_stop_walks_the_table() {
    let (t, mut d) = setup(no_timeout());
    d.on_add_row().unwrap();

    let mut calls = 0;
    for (cmd, expected) in [
        (Command::Start, LifecycleState::Running),
        (Command::Pause, LifecycleState::Paused),
        (Command::Stop, LifecycleState::Stopped),
    ] {
        d.on_command(1, cmd).unwrap();
        calls += 1;
        t.wait_for_calls(calls).await;
        t.release(1, true);
        d.next_outcome().await.unwrap();
        assert_eq!(state_of(&d, 1), expected);
    }
}

#[tokio::test]
async fn illegal_command_makes_no_call() {
    let (t, mut d) = setup(no_timeout());
    d.on_add_row().unwrap();

    let err = d.on_command(1, Command::Pause).unwrap_err();
    assert!(matches!(err, DashboardError::IllegalTransition { id: 1, .. }));
    tokio::task::yield_now().await;
    assert_eq!(t.calls(), 0);
    assert_eq!(state_of(&d, 1), LifecycleState::Stopped);
    assert_eq!(d.stats().rejected, 1);
}

#[tokio::test]
async fn timeout_parks_row_in_error_and_allows_retry() {
    let cfg = Config { command_timeout_ms: 30, ..Default::default() };
    let (t, mut d) = setup(cfg);
    d.on_add_row().unwrap();

    d.on_command(1, Command::Start).unwrap();
    let done = d.next_outcome().await.unwrap();
    assert!(!done.outcome.is_success());
    let row = d.row(1).unwrap();
    assert_eq!(row.lifecycle_state, LifecycleState::Error);
    assert!(row.last_error.as_deref().unwrap().contains("timed out"));
    assert!(!d.is_in_flight(1));
    assert_eq!(t.calls(), 1);

    // every command is legal from Error
    let again = d.on_command(1, Command::Stop).unwrap();
    assert_eq!(again.lifecycle_state, LifecycleState::Stopping);
}

#[tokio::test]
async fn removing_row_cancels_in_flight_command() {
    let (t, mut d) = setup(no_timeout());
    d.on_add_row().unwrap();
    d.on_command(1, Command::Start).unwrap();
    t.wait_for_calls(1).await;

    let removed = d.on_remove_row(1).unwrap();
    assert_eq!(removed.lifecycle_state, LifecycleState::Starting);
    assert_eq!(d.in_flight_count(), 0);
    assert!(d.rows().is_empty());
    assert_eq!(d.row(1).unwrap_err(), DashboardError::RowNotFound { id: 1 });

    let next = d.on_add_row().unwrap();
    assert_eq!(next.id, 2);
    assert!(d.settle().await.is_empty());
}

#[tokio::test]
async fn list_rows_is_stable_between_mutations() {
    let (_t, mut d) = setup(no_timeout());
    for _ in 0..3 {
        d.on_add_row().unwrap();
    }
    let first = d.rows();
    let second = d.rows();
    assert_eq!(first, second);
    let ids: Vec<_> = first.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}
