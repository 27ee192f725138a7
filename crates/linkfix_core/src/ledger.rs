//! Optional sweep ledger: a local SQLite record of every processed matching
//! link plus a resume checkpoint.
//!
//! The checkpoint is a convenience with the same precision as a manually
//! tracked `--offset`; disabling the ledger leaves sweep behavior untouched.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};

const LEDGER_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS fix_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    row_index INTEGER NOT NULL,
    page_id INTEGER NOT NULL,
    archived_url TEXT NOT NULL,
    recovered_url TEXT NOT NULL,
    http_status INTEGER NOT NULL,
    outcome TEXT NOT NULL,
    content_hash TEXT,
    recorded_at_unix INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_fix_log_outcome ON fix_log(outcome);

CREATE TABLE IF NOT EXISTS sweep_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const CHECKPOINT_KEY: &str = "next_row_index";

/// One row appended per processed matching record.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub row_index: usize,
    pub page_id: i64,
    pub archived_url: String,
    pub recovered_url: String,
    pub http_status: u16,
    pub outcome: String,
    /// SHA-256 of the saved text, present only for fixed records.
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerSummary {
    pub total_records: usize,
    pub fixed: usize,
    pub by_outcome: Vec<(String, usize)>,
    pub checkpoint: Option<usize>,
}

#[derive(Debug)]
pub struct FixLedger {
    connection: Connection,
}

impl FixLedger {
    /// Open (creating if needed) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let connection = Connection::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        connection
            .pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL journal mode")?;
        connection
            .execute_batch(LEDGER_SCHEMA_SQL)
            .context("failed to create ledger schema")?;
        Ok(Self { connection })
    }

    pub fn record(&mut self, entry: &LedgerEntry) -> Result<()> {
        let now_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock error")?
            .as_secs();
        self.connection
            .execute(
                "INSERT INTO fix_log (row_index, page_id, archived_url, recovered_url,
                 http_status, outcome, content_hash, recorded_at_unix)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    i64::try_from(entry.row_index).context("row index does not fit into i64")?,
                    entry.page_id,
                    entry.archived_url,
                    entry.recovered_url,
                    i64::from(entry.http_status),
                    entry.outcome,
                    entry.content_hash,
                    i64::try_from(now_unix).context("timestamp does not fit into i64")?,
                ],
            )
            .context("failed to record ledger entry")?;
        Ok(())
    }

    /// Advance the resume checkpoint to the row index after the one just
    /// processed.
    pub fn set_checkpoint(&mut self, next_row_index: usize) -> Result<()> {
        self.connection
            .execute(
                "INSERT INTO sweep_state (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![CHECKPOINT_KEY, next_row_index.to_string()],
            )
            .context("failed to update sweep checkpoint")?;
        Ok(())
    }

    pub fn checkpoint(&self) -> Result<Option<usize>> {
        let value: Option<String> = self
            .connection
            .query_row(
                "SELECT value FROM sweep_state WHERE key = ?1",
                params![CHECKPOINT_KEY],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read sweep checkpoint")?;
        Ok(value.and_then(|value| value.parse::<usize>().ok()))
    }

    pub fn summary(&self) -> Result<LedgerSummary> {
        let total_records: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM fix_log", [], |row| row.get(0))
            .context("failed to count ledger entries")?;

        let mut by_outcome = Vec::new();
        let mut fixed = 0usize;
        let mut statement = self
            .connection
            .prepare("SELECT outcome, COUNT(*) FROM fix_log GROUP BY outcome ORDER BY outcome")
            .context("failed to prepare outcome summary")?;
        let rows = statement
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .context("failed to query outcome summary")?;
        for row in rows {
            let (outcome, count) = row.context("failed to read outcome summary row")?;
            let count = usize::try_from(count).unwrap_or(0);
            if outcome == "fixed" {
                fixed = count;
            }
            by_outcome.push((outcome, count));
        }

        Ok(LedgerSummary {
            total_records: usize::try_from(total_records).unwrap_or(0),
            fixed,
            by_outcome,
            checkpoint: self.checkpoint()?,
        })
    }
}

/// Hash of saved page text, recorded with fixed entries so a later audit can
/// tell whether the page moved on after the sweep.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{FixLedger, LedgerEntry, content_hash};

    fn entry(row_index: usize, outcome: &str) -> LedgerEntry {
        LedgerEntry {
            row_index,
            page_id: 42,
            archived_url: "http://web.archive.org/web/20150101000000/http://example.com/x"
                .to_string(),
            recovered_url: "http://example.com/x".to_string(),
            http_status: 200,
            outcome: outcome.to_string(),
            content_hash: None,
        }
    }

    #[test]
    fn records_and_summarizes_entries() {
        let temp = tempdir().expect("tempdir");
        let mut ledger = FixLedger::open(&temp.path().join("state/linkfix.db")).expect("open");

        ledger.record(&entry(0, "fixed")).expect("record");
        ledger.record(&entry(1, "still dead")).expect("record");
        ledger.record(&entry(2, "still dead")).expect("record");

        let summary = ledger.summary().expect("summary");
        assert_eq!(summary.total_records, 3);
        assert_eq!(summary.fixed, 1);
        assert!(
            summary
                .by_outcome
                .contains(&("still dead".to_string(), 2))
        );
    }

    #[test]
    fn checkpoint_round_trips_and_overwrites() {
        let temp = tempdir().expect("tempdir");
        let mut ledger = FixLedger::open(&temp.path().join("linkfix.db")).expect("open");

        assert_eq!(ledger.checkpoint().expect("checkpoint"), None);
        ledger.set_checkpoint(6).expect("set");
        assert_eq!(ledger.checkpoint().expect("checkpoint"), Some(6));
        ledger.set_checkpoint(12).expect("set");
        assert_eq!(ledger.checkpoint().expect("checkpoint"), Some(12));
    }

    #[test]
    fn reopen_preserves_state() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("linkfix.db");
        {
            let mut ledger = FixLedger::open(&db_path).expect("open");
            ledger.record(&entry(0, "fixed")).expect("record");
            ledger.set_checkpoint(1).expect("set");
        }
        let ledger = FixLedger::open(&db_path).expect("reopen");
        let summary = ledger.summary().expect("summary");
        assert_eq!(summary.total_records, 1);
        assert_eq!(summary.checkpoint, Some(1));
    }

    #[test]
    fn corrupt_database_is_an_error_not_a_fresh_start() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("linkfix.db");
        std::fs::write(&db_path, "not a sqlite database").expect("write junk");
        FixLedger::open(&db_path).expect_err("must fail");
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }
}
