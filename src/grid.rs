//! Boundary with the tabular display widget.
//!
//! The widget gets a column schema and immutable row snapshots, and reports
//! operator interactions back as [`GridEvent`]s. It never mutates rows.

use std::io::Write;

use crate::registry::{RowId, StrategyRow};
use crate::verify::row_sm::{available_commands, Command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRenderer {
    Plain,
    /// Link to the strategy log, opened in a new context.
    LogLink,
    /// Start/Pause/Stop buttons.
    LifecycleControls,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub header: &'static str,
    pub field: &'static str,
    pub editable: bool,
    pub renderer: CellRenderer,
}

pub fn column_schema() -> Vec<ColumnDef> {
    vec![
        ColumnDef { header: "Id", field: "id", editable: false, renderer: CellRenderer::Plain },
        ColumnDef { header: "Product", field: "product", editable: true, renderer: CellRenderer::Plain },
        ColumnDef { header: "Parameter", field: "param1", editable: true, renderer: CellRenderer::Plain },
        ColumnDef { header: "Log", field: "log", editable: false, renderer: CellRenderer::LogLink },
        ColumnDef { header: "State", field: "lifecycle_state", editable: false, renderer: CellRenderer::Plain },
        ColumnDef { header: "operator", field: "start", editable: false, renderer: CellRenderer::LifecycleControls },
    ]
}

pub fn is_editable(field: &str) -> bool {
    column_schema().iter().any(|c| c.field == field && c.editable)
}

/// Operator interactions reported by the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridEvent {
    AddRow,
    CellEdited { id: RowId, field: String, value: String },
    Command { id: RowId, command: Command },
    RemoveRow { id: RowId },
}

/// Imperative update handle handed over once the widget is ready.
pub trait GridApi {
    /// Replaces the whole row set.
    fn set_row_data(&mut self, rows: &[StrategyRow]);
    /// Refreshes a single row in place.
    fn update_row(&mut self, row: &StrategyRow);
}

pub type GridHandle = Box<dyn GridApi + Send>;

/// Which control buttons are enabled for a row.
pub fn enabled_controls(row: &StrategyRow) -> Vec<Command> {
    available_commands(row.lifecycle_state)
}

/// Plain-text table, one line per row.
pub struct ConsoleGrid<W: Write> {
    out: W,
}

impl<W: Write> ConsoleGrid<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_row(&mut self, row: &StrategyRow) {
        let controls: Vec<&str> = enabled_controls(row).iter().map(|c| c.as_str()).collect();
        let controls = if controls.is_empty() { "-".to_string() } else { controls.join("/") };
        let _ = writeln!(
            self.out,
            "{:>4}  {:<10} {:<12} {:<10} {:<9} {:<16} {}{}",
            row.id,
            row.strategy_kind,
            row.product,
            row.param1,
            row.lifecycle_state,
            controls,
            row.log_path(),
            row.last_error.as_ref().map(|e| format!("  ! {}", e)).unwrap_or_default(),
        );
    }
}

impl<W: Write> GridApi for ConsoleGrid<W> {
    fn set_row_data(&mut self, rows: &[StrategyRow]) {
        let _ = writeln!(
            self.out,
            "{:>4}  {:<10} {:<12} {:<10} {:<9} {:<16} {}",
            "Id", "Strategy", "Product", "Parameter", "State", "operator", "Log"
        );
        if rows.is_empty() {
            let _ = writeln!(self.out, "      (no strategies)");
        }
        for row in rows {
            self.write_row(row);
        }
        let _ = self.out.flush();
    }

    fn update_row(&mut self, row: &StrategyRow) {
        self.write_row(row);
        let _ = self.out.flush();
    }
}
