//! Dashboard controller: owns the registry, the dispatcher and the grid handle.
//!
//! Everything here runs on one logical thread. Dispatched commands run as
//! spawned tasks that only do I/O and report back over a channel; the outcome
//! is reconciled here, so row state is never touched concurrently.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::dispatcher::{CommandDispatcher, CommandOutcome, DispatchStats, SharedTransport};
use crate::error::{DashboardError, Result};
use crate::grid::{is_editable, GridEvent, GridHandle};
use crate::logging::{log, log_row_removed, log_session_summary, obj, v_str, Domain, Level};
use crate::registry::{ConfigEdit, RowId, RowRegistry, StrategyRow};
use crate::state::{now_ts, Config};
use crate::storage::CommandJournal;
use crate::verify::row_sm::Command;

/// An outcome after reconciliation. `row` is `None` if the row was removed meanwhile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub outcome: CommandOutcome,
    pub row: Option<StrategyRow>,
}

pub struct Dashboard {
    registry: RowRegistry,
    dispatcher: CommandDispatcher,
    grid: Option<GridHandle>,
    journal: Option<CommandJournal>,
    default_kind: String,
    outcome_tx: mpsc::UnboundedSender<CommandOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<CommandOutcome>,
    tasks: HashMap<RowId, AbortHandle>,
}

impl Dashboard {
    pub fn new(transport: SharedTransport, cfg: &Config) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            registry: RowRegistry::new(),
            dispatcher: CommandDispatcher::new(transport, cfg.command_timeout()),
            grid: None,
            journal: None,
            default_kind: cfg.strategy_kind.clone(),
            outcome_tx,
            outcome_rx,
            tasks: HashMap::new(),
        }
    }

    /// Like `new`, plus the journal when `cfg.journal_path` is set.
    pub fn open(transport: SharedTransport, cfg: &Config) -> anyhow::Result<Self> {
        let dashboard = Self::new(transport, cfg);
        match &cfg.journal_path {
            Some(path) => {
                let mut journal = CommandJournal::new(path)?;
                journal.init()?;
                Ok(dashboard.with_journal(journal))
            }
            None => Ok(dashboard),
        }
    }

    pub fn with_journal(mut self, journal: CommandJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn on_grid_ready(&mut self, handle: GridHandle) {
        self.grid = Some(handle);
        log(
            Level::Debug,
            Domain::Grid,
            "grid_ready",
            obj(&[("rows", serde_json::json!(self.registry.len()))]),
        );
        self.render();
    }

    pub fn on_add_row(&mut self) -> Result<StrategyRow> {
        let kind = self.default_kind.clone();
        self.on_add_row_kind(&kind)
    }

    pub fn on_add_row_kind(&mut self, strategy_kind: &str) -> Result<StrategyRow> {
        let row = self.registry.add_row(strategy_kind)?;
        self.render();
        Ok(row)
    }

    /// Dispatches `command` and returns the row in its optimistic state.
    ///
    /// Must be called from within a tokio runtime; the command itself runs as
    /// a spawned task and its outcome is picked up by `next_outcome`.
    pub fn on_command(&mut self, id: RowId, command: Command) -> Result<StrategyRow> {
        let pending = self.dispatcher.dispatch(&mut self.registry, id, command)?;
        let row = self.registry.get_row(id)?;
        self.push_row(&row);

        let tx = self.outcome_tx.clone();
        let task = tokio::spawn(async move {
            let outcome = pending.resolve().await;
            // receiver lives as long as the dashboard
            let _ = tx.send(outcome);
        });
        self.tasks.insert(id, task.abort_handle());
        Ok(row)
    }

    pub fn on_cell_edit(&mut self, id: RowId, field: &str, value: &str) -> Result<StrategyRow> {
        if !is_editable(field) {
            return Err(DashboardError::NotEditable { field: field.to_string() });
        }
        let edit = match field {
            "product" => ConfigEdit { product: Some(value.to_string()), ..Default::default() },
            "param1" => ConfigEdit { param1: Some(value.to_string()), ..Default::default() },
            other => return Err(DashboardError::NotEditable { field: other.to_string() }),
        };
        let row = self.registry.edit_row(id, edit)?;
        log(
            Level::Info,
            Domain::Registry,
            "row_edited",
            obj(&[
                ("row_id", serde_json::json!(id)),
                ("field", v_str(field)),
                ("value", v_str(value)),
            ]),
        );
        self.push_row(&row);
        Ok(row)
    }

    /// Removes a row and cancels its in-flight command, if any.
    pub fn on_remove_row(&mut self, id: RowId) -> Result<StrategyRow> {
        let row = self.registry.remove_row(id).ok_or(DashboardError::RowNotFound { id })?;
        let cancelled = self.dispatcher.cancel(id);
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
        log_row_removed(id, &row.strategy_kind, cancelled);
        self.render();
        Ok(row)
    }

    /// Routes a widget event. Returns the affected row, if any.
    pub fn handle_event(&mut self, event: GridEvent) -> Result<Option<StrategyRow>> {
        log(
            Level::Debug,
            Domain::Grid,
            "event",
            obj(&[("event", v_str(&format!("{:?}", event)))]),
        );
        match event {
            GridEvent::AddRow => self.on_add_row().map(Some),
            GridEvent::CellEdited { id, field, value } => self.on_cell_edit(id, &field, &value).map(Some),
            GridEvent::Command { id, command } => self.on_command(id, command).map(Some),
            GridEvent::RemoveRow { id } => self.on_remove_row(id).map(|_| None),
        }
    }

    /// Waits for the next command outcome and reconciles it.
    pub async fn next_outcome(&mut self) -> Option<Reconciled> {
        let outcome = self.outcome_rx.recv().await?;
        Some(self.apply_outcome(outcome))
    }

    /// Reconciles outcomes until no command is in flight.
    ///
    /// Without a command timeout this waits for as long as the transport does.
    pub async fn settle(&mut self) -> Vec<Reconciled> {
        let mut done = Vec::new();
        while self.dispatcher.in_flight_count() > 0 {
            match self.next_outcome().await {
                Some(r) => done.push(r),
                None => break,
            }
        }
        done
    }

    fn apply_outcome(&mut self, outcome: CommandOutcome) -> Reconciled {
        self.tasks.remove(&outcome.row_id);
        let row = self.dispatcher.reconcile(&mut self.registry, &outcome);
        if let Some(row) = &row {
            self.push_row(row);
        }
        if let Some(journal) = self.journal.as_mut() {
            if let Err(err) = journal.record(now_ts(), &outcome, row.as_ref()) {
                log(
                    Level::Error,
                    Domain::Audit,
                    "journal_write_failed",
                    obj(&[
                        ("row_id", serde_json::json!(outcome.row_id)),
                        ("msg", v_str(&format!("{:#}", err))),
                    ]),
                );
            }
        }
        Reconciled { outcome, row }
    }

    /// Full re-render. Empty row sets are fine; no grid means nothing to do.
    pub fn render(&mut self) {
        if let Some(grid) = self.grid.as_mut() {
            grid.set_row_data(&self.registry.list_rows());
        }
    }

    fn push_row(&mut self, row: &StrategyRow) {
        if let Some(grid) = self.grid.as_mut() {
            grid.update_row(row);
        }
    }

    pub fn rows(&self) -> Vec<StrategyRow> {
        self.registry.list_rows()
    }

    pub fn row(&self, id: RowId) -> Result<StrategyRow> {
        self.registry.get_row(id)
    }

    pub fn is_in_flight(&self, id: RowId) -> bool {
        self.dispatcher.is_in_flight(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.dispatcher.in_flight_count()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn journal(&self) -> Option<&CommandJournal> {
        self.journal.as_ref()
    }

    pub fn log_summary(&self) {
        let s = self.dispatcher.stats();
        log_session_summary(self.registry.len(), s.dispatched, s.confirmed, s.failed, s.rejected);
    }
}
