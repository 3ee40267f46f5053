//! Dashboard error taxonomy with stable codes.

use std::time::Duration;

use thiserror::Error;

use crate::registry::RowId;
use crate::verify::row_sm::{Command, LifecycleState};

pub type Result<T> = std::result::Result<T, DashboardError>;

/// Errors surfaced to the operator. None of them ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    #[error("[DASH-1001] command already in flight for row {id}")]
    CommandInProgress { id: RowId },

    #[error("[DASH-1002] {command} is not allowed for row {id} while {state}")]
    IllegalTransition {
        id: RowId,
        state: LifecycleState,
        command: Command,
    },

    #[error("[DASH-1101] row {id} not found")]
    RowNotFound { id: RowId },

    #[error("[DASH-1102] row id space exhausted")]
    IdExhausted,

    #[error("[DASH-1201] field {field} is not editable")]
    NotEditable { field: String },
}

impl DashboardError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CommandInProgress { .. } => "DASH-1001",
            Self::IllegalTransition { .. } => "DASH-1002",
            Self::RowNotFound { .. } => "DASH-1101",
            Self::IdExhausted => "DASH-1102",
            Self::NotEditable { .. } => "DASH-1201",
        }
    }
}

/// Why a dispatched command did not reach its confirmed state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandFailure {
    #[error("command failed: {0}")]
    Failed(String),

    #[error("command timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

impl CommandFailure {
    pub fn from_transport(err: &anyhow::Error) -> Self {
        CommandFailure::Failed(format!("{:#}", err))
    }
}
