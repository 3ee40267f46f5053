use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, Result};
use crate::logging::log_row_added;
use crate::verify::row_sm::LifecycleState;

pub type RowId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRow {
    pub id: RowId,
    #[serde(rename = "strategy")]
    pub strategy_kind: String,
    pub product: String,
    pub param1: String,
    pub lifecycle_state: LifecycleState,
    pub last_error: Option<String>,
}

impl StrategyRow {
    fn new(id: RowId, strategy_kind: &str) -> Self {
        Self {
            id,
            strategy_kind: strategy_kind.to_string(),
            product: String::new(),
            param1: String::new(),
            lifecycle_state: LifecycleState::Stopped,
            last_error: None,
        }
    }

    /// Relative link to the server-side strategy log.
    pub fn log_path(&self) -> String {
        format!("/strategy/log/{}/{}", self.strategy_kind, self.id)
    }

    /// Body posted to the command endpoints.
    pub fn payload(&self) -> RowPayload {
        RowPayload {
            id: self.id,
            strategy: self.strategy_kind.clone(),
            product: self.product.clone(),
            param1: self.param1.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowPayload {
    pub id: RowId,
    pub strategy: String,
    pub product: String,
    pub param1: String,
}

/// Status fields written by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusPatch {
    pub lifecycle_state: Option<LifecycleState>,
    /// `Some(None)` clears the error.
    pub last_error: Option<Option<String>>,
}

impl StatusPatch {
    pub fn state(state: LifecycleState) -> Self {
        Self { lifecycle_state: Some(state), last_error: None }
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }
}

/// Fields the operator may edit from the grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigEdit {
    pub product: Option<String>,
    pub param1: Option<String>,
}

/// Authoritative table of strategy rows, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RowRegistry {
    rows: Vec<StrategyRow>,
    last_id: RowId,
}

impl RowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, strategy_kind: &str) -> Result<StrategyRow> {
        let id = self.last_id.checked_add(1).ok_or(DashboardError::IdExhausted)?;
        self.last_id = id;
        let row = StrategyRow::new(id, strategy_kind);
        self.rows.push(row.clone());
        log_row_added(id, strategy_kind);
        Ok(row)
    }

    pub fn get_row(&self, id: RowId) -> Result<StrategyRow> {
        self.find(id).cloned().ok_or(DashboardError::RowNotFound { id })
    }

    /// Returns the updated row, or `None` if it has vanished.
    pub fn update_row(&mut self, id: RowId, patch: StatusPatch) -> Option<StrategyRow> {
        let row = self.find_mut(id)?;
        if let Some(state) = patch.lifecycle_state {
            row.lifecycle_state = state;
        }
        if let Some(err) = patch.last_error {
            row.last_error = err;
        }
        Some(row.clone())
    }

    pub fn edit_row(&mut self, id: RowId, edit: ConfigEdit) -> Result<StrategyRow> {
        let row = self.find_mut(id).ok_or(DashboardError::RowNotFound { id })?;
        if let Some(product) = edit.product {
            row.product = product;
        }
        if let Some(param1) = edit.param1 {
            row.param1 = param1;
        }
        Ok(row.clone())
    }

    pub fn remove_row(&mut self, id: RowId) -> Option<StrategyRow> {
        let idx = self.rows.iter().position(|r| r.id == id)?;
        Some(self.rows.remove(idx))
    }

    pub fn list_rows(&self) -> Vec<StrategyRow> {
        self.rows.clone()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn find(&self, id: RowId) -> Option<&StrategyRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    fn find_mut(&mut self, id: RowId) -> Option<&mut StrategyRow> {
        self.rows.iter_mut().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_row_defaults() {
        let mut reg = RowRegistry::new();
        let row = reg.add_row("sample").unwrap();
        assert_eq!(row.id, 1);
        assert_eq!(row.strategy_kind, "sample");
        assert_eq!(row.lifecycle_state, LifecycleState::Stopped);
        assert!(row.last_error.is_none());
        assert!(row.product.is_empty() && row.param1.is_empty());
    }

    #[test]
    fn test_ids_strictly_increasing() {
        let mut reg = RowRegistry::new();
        let mut prev = 0;
        for i in 0..50 {
            let kind = if i % 2 == 0 { "sample" } else { "other" };
            let row = reg.add_row(kind).unwrap();
            assert!(row.id > prev);
            prev = row.id;
        }
        assert_eq!(reg.len(), 50);
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let mut reg = RowRegistry::new();
        reg.add_row("sample").unwrap();
        let second = reg.add_row("sample").unwrap();
        assert!(reg.remove_row(second.id).is_some());
        let third = reg.add_row("sample").unwrap();
        assert_eq!(third.id, 3);
    }

    #[test]
    fn test_id_exhaustion() {
        let mut reg = RowRegistry { rows: Vec::new(), last_id: RowId::MAX };
        assert_eq!(reg.add_row("sample"), Err(DashboardError::IdExhausted));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut reg = RowRegistry::new();
        for _ in 0..4 {
            reg.add_row("sample").unwrap();
        }
        reg.remove_row(2);
        let ids: Vec<_> = reg.list_rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[test]
    fn test_list_rows_idempotent() {
        let mut reg = RowRegistry::new();
        reg.add_row("sample").unwrap();
        reg.add_row("sample").unwrap();
        assert_eq!(reg.list_rows(), reg.list_rows());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut reg = RowRegistry::new();
        let row = reg.add_row("sample").unwrap();
        let snap = reg.list_rows();
        reg.update_row(row.id, StatusPatch::state(LifecycleState::Starting));
        assert_eq!(snap[0].lifecycle_state, LifecycleState::Stopped);
    }

    #[test]
    fn test_update_vanished_row_is_noop() {
        let mut reg = RowRegistry::new();
        assert!(reg.update_row(9, StatusPatch::state(LifecycleState::Running)).is_none());
    }

    #[test]
    fn test_status_patch_sets_and_clears_error() {
        let mut reg = RowRegistry::new();
        let row = reg.add_row("sample").unwrap();
        let updated = reg
            .update_row(row.id, StatusPatch::default().with_error(Some("boom".into())))
            .unwrap();
        assert_eq!(updated.last_error.as_deref(), Some("boom"));
        assert_eq!(updated.lifecycle_state, LifecycleState::Stopped);
        let cleared = reg.update_row(row.id, StatusPatch::default().with_error(None)).unwrap();
        assert!(cleared.last_error.is_none());
    }

    #[test]
    fn test_edit_row_only_touches_config() {
        let mut reg = RowRegistry::new();
        let row = reg.add_row("sample").unwrap();
        let edited = reg
            .edit_row(row.id, ConfigEdit { product: Some("HSIZ6".into()), param1: None })
            .unwrap();
        assert_eq!(edited.product, "HSIZ6");
        assert_eq!(edited.param1, "");
        assert_eq!(edited.id, row.id);
        assert_eq!(reg.edit_row(42, ConfigEdit::default()), Err(DashboardError::RowNotFound { id: 42 }));
    }

    #[test]
    fn test_get_row_not_found() {
        let reg = RowRegistry::new();
        assert_eq!(reg.get_row(1), Err(DashboardError::RowNotFound { id: 1 }));
    }

    #[test]
    fn test_log_path_and_payload() {
        let mut reg = RowRegistry::new();
        let row = reg.add_row("sample").unwrap();
        assert_eq!(row.log_path(), "/strategy/log/sample/1");
        let body = serde_json::to_value(row.payload()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"id": 1, "strategy": "sample", "product": "", "param1": ""})
        );
    }
}
