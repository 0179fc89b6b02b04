use crate::academic::{Level, Semester};
use crate::error::StoreError;
use crate::store::{
    CourseOffering, CourseResultRecord, NewStudent, OfferingDeletion, OfferingKey, RecordStore,
    ResultFields, ResultKey, StoreResult, StudentPatch, StudentRecord,
};
use rusqlite::{Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

pub const DB_FILE: &str = "records.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            matno TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            middle_name TEXT,
            last_name TEXT NOT NULL,
            department TEXT NOT NULL,
            level TEXT NOT NULL,
            phone TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_lists(
            id TEXT PRIMARY KEY,
            course TEXT NOT NULL,
            session TEXT NOT NULL,
            level TEXT NOT NULL,
            semester TEXT NOT NULL,
            department TEXT NOT NULL,
            credit INTEGER NOT NULL,
            author TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(course, session, level, semester)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            course TEXT NOT NULL,
            session TEXT NOT NULL,
            level TEXT NOT NULL,
            semester TEXT NOT NULL,
            matno TEXT NOT NULL,
            department TEXT NOT NULL,
            score REAL NOT NULL,
            grade TEXT NOT NULL,
            credit INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(course, session, level, semester, matno)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_matno ON results(matno)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_offering ON results(course, session, level, semester)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn decode_err(col: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        col,
        rusqlite::types::Type::Text,
        Box::<dyn std::error::Error + Send + Sync>::from(msg),
    )
}

fn level_at(r: &Row<'_>, col: usize) -> rusqlite::Result<Level> {
    let raw: String = r.get(col)?;
    Level::parse(&raw).ok_or_else(|| decode_err(col, format!("bad level {}", raw)))
}

fn semester_at(r: &Row<'_>, col: usize) -> rusqlite::Result<Semester> {
    let raw: String = r.get(col)?;
    Semester::parse(&raw).ok_or_else(|| decode_err(col, format!("bad semester {}", raw)))
}

fn credit_at(r: &Row<'_>, col: usize) -> rusqlite::Result<u32> {
    let raw: i64 = r.get(col)?;
    u32::try_from(raw).map_err(|_| decode_err(col, format!("bad credit {}", raw)))
}

const STUDENT_COLUMNS: &str = "matno, first_name, middle_name, last_name, department, level, phone, email, password_hash, created_at, updated_at";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        matno: r.get(0)?,
        first_name: r.get(1)?,
        middle_name: r.get(2)?,
        last_name: r.get(3)?,
        department: r.get(4)?,
        level: level_at(r, 5)?,
        phone: r.get(6)?,
        email: r.get(7)?,
        password_hash: r.get(8)?,
        created_at: r.get(9)?,
        updated_at: r.get(10)?,
    })
}

const OFFERING_COLUMNS: &str = "course, session, level, semester, department, credit, author";

fn offering_from_row(r: &Row<'_>) -> rusqlite::Result<CourseOffering> {
    Ok(CourseOffering {
        key: OfferingKey {
            course: r.get(0)?,
            session: r.get(1)?,
            level: level_at(r, 2)?,
            semester: semester_at(r, 3)?,
        },
        department: r.get(4)?,
        credit: credit_at(r, 5)?,
        author: r.get(6)?,
    })
}

const RESULT_COLUMNS: &str = "course, session, level, semester, matno, department, score, grade, credit";

fn result_from_row(r: &Row<'_>) -> rusqlite::Result<CourseResultRecord> {
    Ok(CourseResultRecord {
        key: OfferingKey {
            course: r.get(0)?,
            session: r.get(1)?,
            level: level_at(r, 2)?,
            semester: semester_at(r, 3)?,
        },
        matno: r.get(4)?,
        department: r.get(5)?,
        score: r.get(6)?,
        grade: r.get(7)?,
        credit: credit_at(r, 8)?,
    })
}

/// SQLite-backed [`RecordStore`]. The reconciler's workers share one
/// connection; each call holds the mutex for a single statement (or one
/// transaction), so workers queue here rather than inside SQLite. The
/// configured `busy_timeout` bounds how long a statement waits on a lock held
/// by another process; a row that times out fails with a `store` reason and is
/// not retried.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn set_timeout(&self, timeout: Duration) -> StoreResult<()> {
        self.conn()?.busy_timeout(timeout)?;
        Ok(())
    }
}

impl RecordStore for SqliteStore {
    fn find_student_by_matno(&self, matno: &str) -> StoreResult<Option<StudentRecord>> {
        let sql = format!("SELECT {} FROM students WHERE matno = ?", STUDENT_COLUMNS);
        Ok(self
            .conn()?
            .query_row(&sql, [matno], student_from_row)
            .optional()?)
    }

    fn find_student_by_email(&self, email: &str) -> StoreResult<Option<StudentRecord>> {
        let sql = format!("SELECT {} FROM students WHERE email = ?", STUDENT_COLUMNS);
        Ok(self
            .conn()?
            .query_row(&sql, [email], student_from_row)
            .optional()?)
    }

    fn create_student(&self, s: &NewStudent) -> StoreResult<()> {
        let ts = now();
        self.conn()?.execute(
            "INSERT INTO students(id, matno, email, first_name, middle_name, last_name, department, level, phone, password_hash, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &s.matno,
                &s.email,
                &s.first_name,
                &s.middle_name,
                &s.last_name,
                &s.department,
                s.level.as_str(),
                &s.phone,
                &s.password_hash,
                &ts,
                &ts,
            ),
        )?;
        Ok(())
    }

    fn update_student(&self, matno: &str, p: &StudentPatch) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = match &p.password_hash {
            Some(hash) => conn.execute(
                "UPDATE students
                 SET first_name = ?, middle_name = ?, last_name = ?, level = ?, phone = ?, email = ?, password_hash = ?, updated_at = ?
                 WHERE matno = ?",
                (
                    &p.first_name,
                    &p.middle_name,
                    &p.last_name,
                    p.level.as_str(),
                    &p.phone,
                    &p.email,
                    hash,
                    now(),
                    matno,
                ),
            )?,
            None => conn.execute(
                "UPDATE students
                 SET first_name = ?, middle_name = ?, last_name = ?, level = ?, phone = ?, email = ?, updated_at = ?
                 WHERE matno = ?",
                (
                    &p.first_name,
                    &p.middle_name,
                    &p.last_name,
                    p.level.as_str(),
                    &p.phone,
                    &p.email,
                    now(),
                    matno,
                ),
            )?,
        };
        Ok(changed > 0)
    }

    fn delete_student(&self, matno: &str) -> StoreResult<bool> {
        let n = self
            .conn()?
            .execute("DELETE FROM students WHERE matno = ?", [matno])?;
        Ok(n > 0)
    }

    fn list_students(&self) -> StoreResult<Vec<StudentRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM students ORDER BY created_at DESC, matno",
            STUDENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let out = stmt
            .query_map([], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(out)
    }

    fn find_offering(&self, key: &OfferingKey) -> StoreResult<Option<CourseOffering>> {
        let sql = format!(
            "SELECT {} FROM result_lists
             WHERE course = ? AND session = ? AND level = ? AND semester = ?",
            OFFERING_COLUMNS
        );
        Ok(self
            .conn()?
            .query_row(
                &sql,
                (&key.course, &key.session, key.level.as_str(), key.semester.as_str()),
                offering_from_row,
            )
            .optional()?)
    }

    fn create_offering(&self, o: &CourseOffering) -> StoreResult<()> {
        let ts = now();
        self.conn()?.execute(
            "INSERT INTO result_lists(id, course, session, level, semester, department, credit, author, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &o.key.course,
                &o.key.session,
                o.key.level.as_str(),
                o.key.semester.as_str(),
                &o.department,
                o.credit,
                &o.author,
                &ts,
                &ts,
            ),
        )?;
        Ok(())
    }

    fn update_offering(&self, key: &OfferingKey, credit: u32, department: &str) -> StoreResult<()> {
        let n = self.conn()?.execute(
            "UPDATE result_lists SET credit = ?, department = ?, updated_at = ?
             WHERE course = ? AND session = ? AND level = ? AND semester = ?",
            (
                credit,
                department,
                now(),
                &key.course,
                &key.session,
                key.level.as_str(),
                key.semester.as_str(),
            ),
        )?;
        if n == 0 {
            return Err(StoreError::Other(format!(
                "result list {} {} {} vanished during update",
                key.course,
                key.session,
                key.semester.as_str()
            )));
        }
        Ok(())
    }

    fn delete_offering(&self, key: &OfferingKey) -> StoreResult<OfferingDeletion> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let params = (
            &key.course,
            &key.session,
            key.level.as_str(),
            key.semester.as_str(),
        );
        let results = tx.execute(
            "DELETE FROM results WHERE course = ? AND session = ? AND level = ? AND semester = ?",
            params,
        )?;
        let offerings = tx.execute(
            "DELETE FROM result_lists WHERE course = ? AND session = ? AND level = ? AND semester = ?",
            params,
        )?;
        tx.commit()?;
        Ok(OfferingDeletion { offerings, results })
    }

    fn list_offerings(&self) -> StoreResult<Vec<CourseOffering>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM result_lists ORDER BY created_at DESC, course",
            OFFERING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let out = stmt
            .query_map([], offering_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(out)
    }

    fn find_result(&self, key: &ResultKey) -> StoreResult<Option<CourseResultRecord>> {
        let o = &key.offering;
        let sql = format!(
            "SELECT {} FROM results
             WHERE course = ? AND session = ? AND level = ? AND semester = ? AND matno = ?",
            RESULT_COLUMNS
        );
        Ok(self
            .conn()?
            .query_row(
                &sql,
                (
                    &o.course,
                    &o.session,
                    o.level.as_str(),
                    o.semester.as_str(),
                    &key.matno,
                ),
                result_from_row,
            )
            .optional()?)
    }

    fn create_result(&self, key: &ResultKey, f: &ResultFields) -> StoreResult<()> {
        let o = &key.offering;
        let ts = now();
        self.conn()?.execute(
            "INSERT INTO results(id, course, session, level, semester, matno, department, score, grade, credit, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &o.course,
                &o.session,
                o.level.as_str(),
                o.semester.as_str(),
                &key.matno,
                &f.department,
                f.score,
                &f.grade,
                f.credit,
                &ts,
                &ts,
            ),
        )?;
        Ok(())
    }

    fn update_result(&self, key: &ResultKey, f: &ResultFields) -> StoreResult<()> {
        let o = &key.offering;
        self.conn()?.execute(
            "UPDATE results SET score = ?, grade = ?, credit = ?, department = ?, updated_at = ?
             WHERE course = ? AND session = ? AND level = ? AND semester = ? AND matno = ?",
            (
                f.score,
                &f.grade,
                f.credit,
                &f.department,
                now(),
                &o.course,
                &o.session,
                o.level.as_str(),
                o.semester.as_str(),
                &key.matno,
            ),
        )?;
        Ok(())
    }

    fn delete_result(&self, key: &ResultKey) -> StoreResult<bool> {
        let o = &key.offering;
        let n = self.conn()?.execute(
            "DELETE FROM results
             WHERE course = ? AND session = ? AND level = ? AND semester = ? AND matno = ?",
            (
                &o.course,
                &o.session,
                o.level.as_str(),
                o.semester.as_str(),
                &key.matno,
            ),
        )?;
        Ok(n > 0)
    }

    fn results_for_offering(&self, key: &OfferingKey) -> StoreResult<Vec<CourseResultRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM results
             WHERE course = ? AND session = ? AND level = ? AND semester = ?
             ORDER BY matno",
            RESULT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let out = stmt
            .query_map(
                (&key.course, &key.session, key.level.as_str(), key.semester.as_str()),
                result_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(out)
    }

    fn results_for_student(&self, matno: &str) -> StoreResult<Vec<CourseResultRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM results WHERE matno = ? ORDER BY rowid",
            RESULT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let out = stmt
            .query_map([matno], result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(out)
    }
}
