use std::collections::HashSet;

use chrono::{DateTime, Utc};
use pubscope_core::{CanonicalRecord, Database, StoredRecord};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::harvest::SourceTag;

/// Whether a run writes what it decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    DryRun,
    Commit,
}

impl CommitMode {
    pub fn from_write_flag(write: bool) -> Self {
        if write { Self::Commit } else { Self::DryRun }
    }

    pub fn writes(&self) -> bool {
        matches!(self, Self::Commit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Registry timestamp is not newer than the stored one.
    Unchanged,
    /// The identifier was already reconciled earlier in this batch.
    DuplicateInBatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Inserted,
    Updated {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    Skipped(SkipReason),
}

/// Applies resolved records to the store: insert new identifiers, refresh
/// stale ones, leave the rest alone.
pub struct ReconciliationEngine<'a> {
    db: &'a Database,
    mode: CommitMode,
    seen: HashSet<String>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(db: &'a Database, mode: CommitMode) -> Self {
        Self {
            db,
            mode,
            seen: HashSet::new(),
        }
    }

    pub fn mode(&self) -> CommitMode {
        self.mode
    }

    pub fn reconcile(
        &mut self,
        record: CanonicalRecord,
        source: SourceTag,
    ) -> Result<ReconcileOutcome> {
        if !self.seen.insert(record.identifier.clone()) {
            warn!(identifier = %record.identifier, %source, "already reconciled in this batch");
            return Ok(ReconcileOutcome::Skipped(SkipReason::DuplicateInBatch));
        }

        let Some(mut stored) = self.db.get_record(&record.identifier)? else {
            let identifier = record.identifier.clone();
            if self.mode.writes() {
                self.db.insert_record(&StoredRecord::new(record, source.as_str()))?;
            }
            info!(%identifier, %source, "inserted");
            return Ok(ReconcileOutcome::Inserted);
        };

        let previous = stored.stored_last_modified();
        if !stored.apply_refresh(record) {
            debug!(identifier = %stored.identifier(), "unchanged");
            return Ok(ReconcileOutcome::Skipped(SkipReason::Unchanged));
        }
        let current = stored.stored_last_modified();
        if self.mode.writes() && !self.db.update_record_if_newer(&stored)? {
            debug!(identifier = %stored.identifier(), "store already holds this stamp");
            return Ok(ReconcileOutcome::Skipped(SkipReason::Unchanged));
        }
        info!(identifier = %stored.identifier(), %previous, %current, "updated");
        Ok(ReconcileOutcome::Updated { previous, current })
    }
}
