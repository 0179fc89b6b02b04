use crate::error::RowError;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Created,
    /// Result row overwritten in place.
    Updated,
    /// Student row whose email or matno is already registered.
    AlreadyExists,
    Skipped,
}

/// Per-call accumulator. The calling thread folds per-row outcomes into one
/// report; `merge` joins it with the parse-stage failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub created: usize,
    pub updated_or_duplicate: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub failures: Vec<RowError>,
}

impl BatchReport {
    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Created => self.created += 1,
            RowOutcome::Updated | RowOutcome::AlreadyExists => self.updated_or_duplicate += 1,
            RowOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn record_failure(&mut self, error: RowError) {
        self.failed += 1;
        self.failures.push(error);
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.created += other.created;
        self.updated_or_duplicate += other.updated_or_duplicate;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.cancelled |= other.cancelled;
        self.failures.extend(other.failures);
        self.failures.sort_by_key(|f| f.line);
    }

    pub fn processed(&self) -> usize {
        self.created + self.updated_or_duplicate + self.failed
    }

    pub fn summary(&self) -> String {
        format!(
            "Operation completed, Total added: {}, Total updated: {}, Failed: {}.",
            self.created, self.updated_or_duplicate, self.failed
        )
    }
}
