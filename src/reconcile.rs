//! Row reconciliation: natural-key lookup, create vs update, derived grades.
//!
//! Rows are grouped by natural key (matno for results; email or matno for
//! students). A bounded pool of scoped workers pulls whole groups from a
//! shared cursor, runs each group's rows in input order, and sends per-row
//! outcomes back over a channel; the calling thread folds them into one
//! [`BatchReport`]. Distinct groups never touch the same record, so the stored
//! state matches a sequential run. The course offering upsert of a result
//! batch completes on the calling thread before any worker starts.

use crate::academic::{Level, Semester};
use crate::credentials::CredentialHasher;
use crate::error::{ImportError, RowError, RowErrorReason, StoreError};
use crate::grades::GradeScale;
use crate::report::{BatchReport, RowOutcome};
use crate::rows::{self, ImportKind, NormalizedRow, ParsedRows, ResultRow, StudentRow, Table};
use crate::store::{CourseOffering, NewStudent, OfferingKey, RecordStore, ResultFields};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct StudentBatch {
    pub department: String,
    pub level: Level,
}

impl StudentBatch {
    pub fn new(department: &str, level: &str) -> Result<Self, ImportError> {
        Ok(Self {
            department: required(department, "department")?.to_ascii_uppercase(),
            level: parse_level(level)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultBatch {
    pub offering: OfferingKey,
    pub department: String,
    pub credit: u32,
    pub author: String,
}

impl ResultBatch {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        course: &str,
        department: &str,
        level: &str,
        session: &str,
        semester: &str,
        credit: i64,
        author: &str,
    ) -> Result<Self, ImportError> {
        let semester = Semester::parse(semester).ok_or_else(|| {
            ImportError::InvalidContext("semester must be one of: first, second".into())
        })?;
        let credit = u32::try_from(credit)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| ImportError::InvalidContext("credit must be a positive integer".into()))?;
        Ok(Self {
            offering: OfferingKey {
                course: rows::normalize_course(required(course, "course")?),
                session: required(session, "session")?.to_string(),
                level: parse_level(level)?,
                semester,
            },
            department: required(department, "department")?.to_ascii_uppercase(),
            credit,
            author: required(author, "author")?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchContext {
    Students(StudentBatch),
    Results(ResultBatch),
}

impl BatchContext {
    pub fn kind(&self) -> ImportKind {
        match self {
            Self::Students(_) => ImportKind::Students,
            Self::Results(_) => ImportKind::Results,
        }
    }
}

fn required<'a>(v: &'a str, name: &str) -> Result<&'a str, ImportError> {
    let t = v.trim();
    if t.is_empty() {
        return Err(ImportError::InvalidContext(format!("missing {}", name)));
    }
    Ok(t)
}

fn parse_level(v: &str) -> Result<Level, ImportError> {
    Level::parse(v).ok_or_else(|| {
        ImportError::InvalidContext("level must be one of: 100, 200, 300, 400, 500, 600".into())
    })
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions<'a> {
    pub workers: usize,
    /// Checked before each row; rows not yet started are counted as skipped.
    pub cancel: Option<&'a AtomicBool>,
}

impl Default for ReconcileOptions<'_> {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cancel: None,
        }
    }
}

pub struct Reconciler<'a, S: RecordStore + ?Sized, H: CredentialHasher + ?Sized> {
    store: &'a S,
    hasher: &'a H,
    scale: &'a GradeScale,
    options: ReconcileOptions<'a>,
}

impl<'a, S, H> Reconciler<'a, S, H>
where
    S: RecordStore + ?Sized,
    H: CredentialHasher + ?Sized,
{
    pub fn new(store: &'a S, hasher: &'a H, scale: &'a GradeScale) -> Self {
        Self {
            store,
            hasher,
            scale,
            options: ReconcileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions<'a>) -> Self {
        self.options = options;
        self
    }

    /// Validates the table against the import's schema, then reconciles it.
    pub fn import_table(
        &self,
        table: &Table,
        ctx: &BatchContext,
    ) -> Result<BatchReport, ImportError> {
        let parsed = rows::parse_rows(table, ctx.kind())?;
        self.reconcile(parsed, ctx)
    }

    pub fn reconcile(
        &self,
        parsed: ParsedRows,
        ctx: &BatchContext,
    ) -> Result<BatchReport, ImportError> {
        let started = Instant::now();
        let total = parsed.total();
        if let Some(row) = parsed.rows.iter().find(|r| !row_matches(r, ctx)) {
            return Err(ImportError::InvalidContext(format!(
                "line {}: row does not belong to a {:?} import",
                row.line(),
                ctx.kind()
            )));
        }

        if let BatchContext::Results(batch) = ctx {
            self.upsert_offering(batch).map_err(ImportError::Offering)?;
        }

        let mut report = BatchReport::default();
        for e in parsed.errors {
            warn!(line = e.line, reason = e.reason.as_str(), "row rejected: {}", e.message);
            report.record_failure(e);
        }
        report.merge(self.fan_out(&parsed.rows, ctx));

        info!(
            kind = ?ctx.kind(),
            rows = total,
            created = report.created,
            updated_or_duplicate = report.updated_or_duplicate,
            failed = report.failed,
            skipped = report.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch reconciled"
        );
        Ok(report)
    }

    fn upsert_offering(&self, batch: &ResultBatch) -> Result<(), StoreError> {
        match self.store.find_offering(&batch.offering)? {
            Some(_) => {
                self.store
                    .update_offering(&batch.offering, batch.credit, &batch.department)?;
                debug!(course = %batch.offering.course, credit = batch.credit, "offering updated");
            }
            None => {
                self.store.create_offering(&CourseOffering {
                    key: batch.offering.clone(),
                    department: batch.department.clone(),
                    credit: batch.credit,
                    author: batch.author.clone(),
                })?;
                debug!(course = %batch.offering.course, credit = batch.credit, "offering created");
            }
        }
        Ok(())
    }

    fn fan_out(&self, rows: &[NormalizedRow], ctx: &BatchContext) -> BatchReport {
        let mut report = BatchReport::default();
        if rows.is_empty() {
            return report;
        }

        let groups = key_groups(rows);
        let workers = self.options.workers.clamp(1, MAX_WORKERS).min(groups.len());
        let cursor = AtomicUsize::new(0);
        let mut outcomes: Vec<Option<Result<RowOutcome, RowError>>> = vec![None; rows.len()];

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            for _ in 0..workers {
                let tx = tx.clone();
                let cursor = &cursor;
                let groups = &groups;
                scope.spawn(move || loop {
                    let g = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(group) = groups.get(g) else {
                        break;
                    };
                    for &idx in group {
                        let outcome = if self.is_cancelled() {
                            Ok(RowOutcome::Skipped)
                        } else {
                            self.process_row(&rows[idx], ctx)
                        };
                        if tx.send((idx, outcome)).is_err() {
                            return;
                        }
                    }
                });
            }
            drop(tx);
            for (idx, outcome) in rx {
                outcomes[idx] = Some(outcome);
            }
        });

        for (row, outcome) in rows.iter().zip(outcomes) {
            match outcome {
                Some(Ok(RowOutcome::Skipped)) => {
                    report.cancelled = true;
                    report.record(RowOutcome::Skipped);
                }
                Some(Ok(o)) => report.record(o),
                Some(Err(e)) => {
                    warn!(line = e.line, reason = e.reason.as_str(), "row failed: {}", e.message);
                    report.record_failure(e);
                }
                None => report.record_failure(RowError::new(
                    row.line(),
                    RowErrorReason::Store,
                    "worker exited before reporting this row",
                )),
            }
        }
        report
    }

    fn is_cancelled(&self) -> bool {
        self.options
            .cancel
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    fn process_row(&self, row: &NormalizedRow, ctx: &BatchContext) -> Result<RowOutcome, RowError> {
        match (row, ctx) {
            (NormalizedRow::Student(r), BatchContext::Students(b)) => self.import_student(r, b),
            (NormalizedRow::Result(r), BatchContext::Results(b)) => self.import_result(r, b),
            _ => Err(RowError::new(
                row.line(),
                RowErrorReason::KindMismatch,
                format!("row does not belong to a {:?} import", ctx.kind()),
            )),
        }
    }

    /// Additive only: an email or matno that is already registered is never
    /// overwritten.
    fn import_student(&self, row: &StudentRow, batch: &StudentBatch) -> Result<RowOutcome, RowError> {
        let store_err = |e: StoreError| RowError::new(row.line, RowErrorReason::Store, e.to_string());

        if self
            .store
            .find_student(&row.email, &row.matno)
            .map_err(store_err)?
            .is_some()
        {
            return Ok(RowOutcome::AlreadyExists);
        }

        let password_hash = self
            .hasher
            .hash(&row.password)
            .map_err(|e| RowError::new(row.line, RowErrorReason::Credential, e.to_string()))?;
        self.store
            .create_student(&NewStudent {
                matno: row.matno.clone(),
                first_name: row.firstname.clone(),
                middle_name: row.middlename.clone(),
                last_name: row.lastname.clone(),
                department: batch.department.clone(),
                level: batch.level,
                phone: row.phone.clone(),
                email: row.email.clone(),
                password_hash,
            })
            .map_err(store_err)?;
        Ok(RowOutcome::Created)
    }

    fn import_result(&self, row: &ResultRow, batch: &ResultBatch) -> Result<RowOutcome, RowError> {
        let store_err = |e: StoreError| RowError::new(row.line, RowErrorReason::Store, e.to_string());

        let grade = self
            .scale
            .grade_of(row.score)
            .map_err(|e| RowError::new(row.line, RowErrorReason::InvalidScore, e.to_string()))?;
        let key = batch.offering.result_key(&row.matno);
        let fields = ResultFields {
            score: row.score,
            grade: grade.to_string(),
            credit: batch.credit,
            department: batch.department.clone(),
        };

        match self.store.find_result(&key).map_err(store_err)? {
            Some(_) => {
                self.store.update_result(&key, &fields).map_err(store_err)?;
                Ok(RowOutcome::Updated)
            }
            None => {
                self.store.create_result(&key, &fields).map_err(store_err)?;
                Ok(RowOutcome::Created)
            }
        }
    }
}

fn natural_keys(row: &NormalizedRow) -> Vec<String> {
    match row {
        NormalizedRow::Student(r) => vec![format!("email:{}", r.email), format!("matno:{}", r.matno)],
        NormalizedRow::Result(r) => vec![format!("matno:{}", r.matno)],
    }
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Partitions row indices so that rows sharing any natural key land in the
/// same group. Groups are ordered by their first row; each group lists its
/// rows in input order.
fn key_groups(rows: &[NormalizedRow]) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..rows.len()).collect();
    let mut owner: HashMap<String, usize> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        for key in natural_keys(row) {
            match owner.get(&key) {
                Some(&first) => {
                    let a = find_root(&mut parent, first);
                    let b = find_root(&mut parent, idx);
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    owner.insert(key, idx);
                }
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut slot: HashMap<usize, usize> = HashMap::new();
    for idx in 0..rows.len() {
        let root = find_root(&mut parent, idx);
        let g = *slot.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(idx);
    }
    groups
}

fn row_matches(row: &NormalizedRow, ctx: &BatchContext) -> bool {
    matches!(
        (row, ctx),
        (NormalizedRow::Student(_), BatchContext::Students(_))
            | (NormalizedRow::Result(_), BatchContext::Results(_))
    )
}
