//! Per-row command dispatch with an in-flight lock.
//!
//! `dispatch` validates and applies the optimistic state synchronously, then
//! hands back a [`PendingCommand`]. Resolving it performs the network call and
//! yields a [`CommandOutcome`], which must be fed to [`CommandDispatcher::reconcile`]
//! to confirm or revert the row and release the lock.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};

use crate::error::{CommandFailure, DashboardError, Result};
use crate::logging::{log_command_dispatch, log_command_outcome, log_command_rejected, log_row_missing};
use crate::registry::{RowId, RowRegistry, StatusPatch, StrategyRow};
use crate::transport::CommandTransport;
use crate::verify::row_sm::{begin, Command, LifecycleState};

pub type SharedTransport = Arc<dyn CommandTransport + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub row_id: RowId,
    pub command: Command,
    pub prior_state: LifecycleState,
    pub result: std::result::Result<(), CommandFailure>,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct PendingCommand {
    row_id: RowId,
    command: Command,
    prior_state: LifecycleState,
    timeout: Option<Duration>,
    send: BoxFuture<'static, anyhow::Result<()>>,
}

impl PendingCommand {
    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn prior_state(&self) -> LifecycleState {
        self.prior_state
    }

    /// Runs the command. Transport errors become `CommandFailure` here and go no further.
    pub async fn resolve(self) -> CommandOutcome {
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.send).await {
                Ok(sent) => sent.map_err(|e| CommandFailure::from_transport(&e)),
                Err(_) => Err(CommandFailure::TimedOut(limit)),
            },
            None => self.send.await.map_err(|e| CommandFailure::from_transport(&e)),
        };
        CommandOutcome {
            row_id: self.row_id,
            command: self.command,
            prior_state: self.prior_state,
            result,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub confirmed: u64,
    pub failed: u64,
    pub rejected: u64,
}

pub struct CommandDispatcher {
    transport: SharedTransport,
    in_flight: HashSet<RowId>,
    command_timeout: Option<Duration>,
    stats: DispatchStats,
}

impl CommandDispatcher {
    pub fn new(transport: SharedTransport, command_timeout: Option<Duration>) -> Self {
        Self {
            transport,
            in_flight: HashSet::new(),
            command_timeout,
            stats: DispatchStats::default(),
        }
    }

    pub fn dispatch(
        &mut self,
        registry: &mut RowRegistry,
        id: RowId,
        command: Command,
    ) -> Result<PendingCommand> {
        if self.in_flight.contains(&id) {
            return Err(self.reject(id, command, DashboardError::CommandInProgress { id }));
        }
        let row = match registry.get_row(id) {
            Ok(row) => row,
            Err(err) => return Err(self.reject(id, command, err)),
        };
        let prior_state = row.lifecycle_state;
        let Some(optimistic) = begin(prior_state, command) else {
            let err = DashboardError::IllegalTransition { id, state: prior_state, command };
            return Err(self.reject(id, command, err));
        };

        registry.update_row(id, StatusPatch::state(optimistic));
        self.in_flight.insert(id);
        self.stats.dispatched += 1;
        log_command_dispatch(id, &row.strategy_kind, command.as_str(), prior_state.as_str(), optimistic.as_str());

        let transport = Arc::clone(&self.transport);
        let payload = row.payload();
        let send = async move { transport.send(command, &payload).await }.boxed();

        Ok(PendingCommand {
            row_id: id,
            command,
            prior_state,
            timeout: self.command_timeout,
            send,
        })
    }

    /// Applies an outcome and releases the row's lock.
    ///
    /// Success confirms the target state and clears `last_error`. A failed
    /// command restores the pre-dispatch state; a timed out one parks the row
    /// in `Error`. Returns `None` when the row no longer exists.
    pub fn reconcile(&mut self, registry: &mut RowRegistry, outcome: &CommandOutcome) -> Option<StrategyRow> {
        self.in_flight.remove(&outcome.row_id);

        let patch = match &outcome.result {
            Ok(()) => {
                self.stats.confirmed += 1;
                StatusPatch::state(outcome.command.confirmed_state()).with_error(None)
            }
            Err(failure @ CommandFailure::Failed(_)) => {
                self.stats.failed += 1;
                StatusPatch::state(outcome.prior_state).with_error(Some(failure.to_string()))
            }
            Err(failure @ CommandFailure::TimedOut(_)) => {
                self.stats.failed += 1;
                StatusPatch::state(LifecycleState::Error).with_error(Some(failure.to_string()))
            }
        };

        match registry.update_row(outcome.row_id, patch) {
            Some(row) => {
                log_command_outcome(
                    row.id,
                    outcome.command.as_str(),
                    row.lifecycle_state.as_str(),
                    row.last_error.as_deref(),
                );
                Some(row)
            }
            None => {
                log_row_missing(outcome.row_id, outcome.command.as_str());
                None
            }
        }
    }

    /// Drops the lock without an outcome. Returns whether one was held.
    pub fn cancel(&mut self, id: RowId) -> bool {
        self.in_flight.remove(&id)
    }

    pub fn is_in_flight(&self, id: RowId) -> bool {
        self.in_flight.contains(&id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    fn reject(&mut self, id: RowId, command: Command, err: DashboardError) -> DashboardError {
        self.stats.rejected += 1;
        log_command_rejected(id, command.as_str(), err.code(), &err.to_string());
        err
    }
}
