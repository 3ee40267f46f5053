use anyhow::Result;
use rusqlite::{params, Connection};

use crate::dispatcher::CommandOutcome;
use crate::registry::StrategyRow;

/// SQLite audit trail of reconciled command outcomes.
pub struct CommandJournal {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub ts: u64,
    pub row_id: u64,
    pub strategy: String,
    pub command: String,
    pub prior_state: String,
    pub final_state: Option<String>,
    pub error: Option<String>,
}

impl CommandJournal {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS commands (
                ts INTEGER NOT NULL,
                row_id INTEGER NOT NULL,
                strategy TEXT NOT NULL,
                command TEXT NOT NULL,
                prior_state TEXT NOT NULL,
                final_state TEXT,
                error TEXT
            );
            COMMIT;",
        )?;
        Ok(())
    }

    /// `row` is `None` when the outcome arrived for a removed row.
    pub fn record(&mut self, ts: u64, outcome: &CommandOutcome, row: Option<&StrategyRow>) -> Result<()> {
        let error = outcome.result.as_ref().err().map(|f| f.to_string());
        self.conn.execute(
            "INSERT INTO commands (ts, row_id, strategy, command, prior_state, final_state, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ts as i64,
                outcome.row_id as i64,
                row.map(|r| r.strategy_kind.as_str()).unwrap_or(""),
                outcome.command.as_str(),
                outcome.prior_state.as_str(),
                row.map(|r| r.lifecycle_state.as_str()),
                error,
            ],
        )?;
        Ok(())
    }

    pub fn entries_for(&self, row_id: u64) -> Result<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT ts, row_id, strategy, command, prior_state, final_state, error
             FROM commands WHERE row_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![row_id as i64], |r| {
            Ok(JournalEntry {
                ts: r.get::<_, i64>(0)? as u64,
                row_id: r.get::<_, i64>(1)? as u64,
                strategy: r.get(2)?,
                command: r.get(3)?,
                prior_state: r.get(4)?,
                final_state: r.get(5)?,
                error: r.get(6)?,
            })
        })?;
        let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM commands", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandFailure;
    use crate::registry::{RowRegistry, StatusPatch};
    use crate::verify::row_sm::{Command, LifecycleState};

    #[test]
    fn test_record_success_and_failure() {
        let mut journal = CommandJournal::in_memory().unwrap();
        journal.init().unwrap();
        let mut reg = RowRegistry::new();
        let row = reg.add_row("sample").unwrap();

        let ok = CommandOutcome {
            row_id: row.id,
            command: Command::Start,
            prior_state: LifecycleState::Stopped,
            result: Ok(()),
        };
        let running = reg.update_row(row.id, StatusPatch::state(LifecycleState::Running)).unwrap();
        journal.record(100, &ok, Some(&running)).unwrap();

        let failed = CommandOutcome {
            row_id: row.id,
            command: Command::Stop,
            prior_state: LifecycleState::Running,
            result: Err(CommandFailure::Failed("500".into())),
        };
        journal.record(101, &failed, Some(&running)).unwrap();

        let entries = journal.entries_for(row.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].final_state.as_deref(), Some("running"));
        assert!(entries[0].error.is_none());
        assert_eq!(entries[1].command, "stop");
        assert_eq!(entries[1].error.as_deref(), Some("command failed: 500"));
    }

    #[test]
    fn test_record_for_removed_row() {
        let mut journal = CommandJournal::in_memory().unwrap();
        journal.init().unwrap();
        let outcome = CommandOutcome {
            row_id: 5,
            command: Command::Stop,
            prior_state: LifecycleState::Running,
            result: Ok(()),
        };
        journal.record(1, &outcome, None).unwrap();
        let entries = journal.entries_for(5).unwrap();
        assert_eq!(entries[0].final_state, None);
        assert_eq!(entries[0].strategy, "");
    }

    #[test]
    fn test_journal_on_disk_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.sqlite");
        let path = path.to_str().unwrap();
        {
            let mut journal = CommandJournal::new(path).unwrap();
            journal.init().unwrap();
            let outcome = CommandOutcome {
                row_id: 1,
                command: Command::Start,
                prior_state: LifecycleState::Stopped,
                result: Ok(()),
            };
            journal.record(1, &outcome, None).unwrap();
        }
        let mut reopened = CommandJournal::new(path).unwrap();
        reopened.init().unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
    }
}
