use crate::academic::{Level, Semester};
use crate::error::StoreError;
use serde::Serialize;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub matno: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub department: String,
    pub level: Level,
    pub phone: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

impl StudentRecord {
    pub fn display_name(&self) -> String {
        match self.middle_name.as_deref() {
            Some(m) => format!("{} {} {}", self.first_name, m, self.last_name),
            None => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub matno: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub department: String,
    pub level: Level,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
}

/// Profile edit. `password_hash: None` keeps the stored credential.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentPatch {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub level: Level,
    pub phone: String,
    pub email: String,
    pub password_hash: Option<String>,
}

/// Natural key of a course offering (a "result list").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferingKey {
    pub course: String,
    pub session: String,
    pub level: Level,
    pub semester: Semester,
}

impl OfferingKey {
    pub fn result_key(&self, matno: &str) -> ResultKey {
        ResultKey {
            offering: self.clone(),
            matno: matno.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseOffering {
    #[serde(flatten)]
    pub key: OfferingKey,
    pub department: String,
    pub credit: u32,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub offering: OfferingKey,
    pub matno: String,
}

/// Fields written on create and overwritten on re-import.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFields {
    pub score: f64,
    pub grade: String,
    pub credit: u32,
    pub department: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseResultRecord {
    #[serde(flatten)]
    pub key: OfferingKey,
    pub matno: String,
    pub department: String,
    pub score: f64,
    pub grade: String,
    pub credit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferingDeletion {
    pub offerings: usize,
    pub results: usize,
}

/// Persistence boundary for the engine. Every lookup is by natural key.
///
/// Implementations must be shareable across the reconciler's worker threads.
pub trait RecordStore: Sync {
    fn find_student_by_matno(&self, matno: &str) -> StoreResult<Option<StudentRecord>>;
    fn find_student_by_email(&self, email: &str) -> StoreResult<Option<StudentRecord>>;
    fn create_student(&self, student: &NewStudent) -> StoreResult<()>;
    fn update_student(&self, matno: &str, patch: &StudentPatch) -> StoreResult<bool>;
    fn delete_student(&self, matno: &str) -> StoreResult<bool>;
    fn list_students(&self) -> StoreResult<Vec<StudentRecord>>;

    fn find_offering(&self, key: &OfferingKey) -> StoreResult<Option<CourseOffering>>;
    fn create_offering(&self, offering: &CourseOffering) -> StoreResult<()>;
    fn update_offering(&self, key: &OfferingKey, credit: u32, department: &str)
        -> StoreResult<()>;
    /// Removes the offering and every result sharing its key.
    fn delete_offering(&self, key: &OfferingKey) -> StoreResult<OfferingDeletion>;
    fn list_offerings(&self) -> StoreResult<Vec<CourseOffering>>;

    fn find_result(&self, key: &ResultKey) -> StoreResult<Option<CourseResultRecord>>;
    fn create_result(&self, key: &ResultKey, fields: &ResultFields) -> StoreResult<()>;
    fn update_result(&self, key: &ResultKey, fields: &ResultFields) -> StoreResult<()>;
    fn delete_result(&self, key: &ResultKey) -> StoreResult<bool>;
    fn results_for_offering(&self, key: &OfferingKey) -> StoreResult<Vec<CourseResultRecord>>;
    fn results_for_student(&self, matno: &str) -> StoreResult<Vec<CourseResultRecord>>;

    fn find_student(&self, email: &str, matno: &str) -> StoreResult<Option<StudentRecord>> {
        if let Some(s) = self.find_student_by_email(email)? {
            return Ok(Some(s));
        }
        self.find_student_by_matno(matno)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory store for engine tests. Rows whose matno is listed in
    /// `fail_matnos` error on every write.
    #[derive(Default)]
    pub struct MemoryStore {
        pub students: Mutex<BTreeMap<String, StudentRecord>>,
        pub offerings: Mutex<Vec<CourseOffering>>,
        pub results: Mutex<Vec<CourseResultRecord>>,
        pub fail_matnos: Vec<String>,
    }

    impl MemoryStore {
        pub fn failing_on(matnos: &[&str]) -> Self {
            Self {
                fail_matnos: matnos.iter().map(|m| m.to_string()).collect(),
                ..Self::default()
            }
        }

        fn check(&self, matno: &str) -> StoreResult<()> {
            if self.fail_matnos.iter().any(|m| m == matno) {
                return Err(StoreError::Other(format!("injected failure for {}", matno)));
            }
            Ok(())
        }
    }

    fn lock<T>(m: &Mutex<T>) -> StoreResult<std::sync::MutexGuard<'_, T>> {
        m.lock().map_err(|_| StoreError::Poisoned)
    }

    impl RecordStore for MemoryStore {
        fn find_student_by_matno(&self, matno: &str) -> StoreResult<Option<StudentRecord>> {
            Ok(lock(&self.students)?.get(matno).cloned())
        }

        fn find_student_by_email(&self, email: &str) -> StoreResult<Option<StudentRecord>> {
            Ok(lock(&self.students)?
                .values()
                .find(|s| s.email == email)
                .cloned())
        }

        fn create_student(&self, s: &NewStudent) -> StoreResult<()> {
            self.check(&s.matno)?;
            let mut students = lock(&self.students)?;
            if students.contains_key(&s.matno) || students.values().any(|x| x.email == s.email) {
                return Err(StoreError::Other("unique constraint".into()));
            }
            students.insert(
                s.matno.clone(),
                StudentRecord {
                    matno: s.matno.clone(),
                    first_name: s.first_name.clone(),
                    middle_name: s.middle_name.clone(),
                    last_name: s.last_name.clone(),
                    department: s.department.clone(),
                    level: s.level,
                    phone: s.phone.clone(),
                    email: s.email.clone(),
                    password_hash: s.password_hash.clone(),
                    created_at: "t0".into(),
                    updated_at: "t0".into(),
                },
            );
            Ok(())
        }

        fn update_student(&self, matno: &str, patch: &StudentPatch) -> StoreResult<bool> {
            let mut students = lock(&self.students)?;
            let Some(s) = students.get_mut(matno) else {
                return Ok(false);
            };
            s.first_name = patch.first_name.clone();
            s.middle_name = patch.middle_name.clone();
            s.last_name = patch.last_name.clone();
            s.level = patch.level;
            s.phone = patch.phone.clone();
            s.email = patch.email.clone();
            if let Some(h) = &patch.password_hash {
                s.password_hash = h.clone();
            }
            Ok(true)
        }

        fn delete_student(&self, matno: &str) -> StoreResult<bool> {
            Ok(lock(&self.students)?.remove(matno).is_some())
        }

        fn list_students(&self) -> StoreResult<Vec<StudentRecord>> {
            Ok(lock(&self.students)?.values().cloned().collect())
        }

        fn find_offering(&self, key: &OfferingKey) -> StoreResult<Option<CourseOffering>> {
            Ok(lock(&self.offerings)?
                .iter()
                .find(|o| o.key == *key)
                .cloned())
        }

        fn create_offering(&self, offering: &CourseOffering) -> StoreResult<()> {
            lock(&self.offerings)?.push(offering.clone());
            Ok(())
        }

        fn update_offering(
            &self,
            key: &OfferingKey,
            credit: u32,
            department: &str,
        ) -> StoreResult<()> {
            for o in lock(&self.offerings)?.iter_mut().filter(|o| o.key == *key) {
                o.credit = credit;
                o.department = department.to_string();
            }
            Ok(())
        }

        fn delete_offering(&self, key: &OfferingKey) -> StoreResult<OfferingDeletion> {
            let mut offerings = lock(&self.offerings)?;
            let before = offerings.len();
            offerings.retain(|o| o.key != *key);
            let mut results = lock(&self.results)?;
            let before_results = results.len();
            results.retain(|r| r.key != *key);
            Ok(OfferingDeletion {
                offerings: before - offerings.len(),
                results: before_results - results.len(),
            })
        }

        fn list_offerings(&self) -> StoreResult<Vec<CourseOffering>> {
            Ok(lock(&self.offerings)?.clone())
        }

        fn find_result(&self, key: &ResultKey) -> StoreResult<Option<CourseResultRecord>> {
            Ok(lock(&self.results)?
                .iter()
                .find(|r| r.key == key.offering && r.matno == key.matno)
                .cloned())
        }

        fn create_result(&self, key: &ResultKey, f: &ResultFields) -> StoreResult<()> {
            self.check(&key.matno)?;
            let mut results = lock(&self.results)?;
            if results
                .iter()
                .any(|r| r.key == key.offering && r.matno == key.matno)
            {
                return Err(StoreError::Other("unique constraint".into()));
            }
            results.push(CourseResultRecord {
                key: key.offering.clone(),
                matno: key.matno.clone(),
                department: f.department.clone(),
                score: f.score,
                grade: f.grade.clone(),
                credit: f.credit,
            });
            Ok(())
        }

        fn update_result(&self, key: &ResultKey, f: &ResultFields) -> StoreResult<()> {
            self.check(&key.matno)?;
            for r in lock(&self.results)?
                .iter_mut()
                .filter(|r| r.key == key.offering && r.matno == key.matno)
            {
                r.score = f.score;
                r.grade = f.grade.clone();
                r.credit = f.credit;
                r.department = f.department.clone();
            }
            Ok(())
        }

        fn delete_result(&self, key: &ResultKey) -> StoreResult<bool> {
            let mut results = lock(&self.results)?;
            let before = results.len();
            results.retain(|r| !(r.key == key.offering && r.matno == key.matno));
            Ok(results.len() != before)
        }

        fn results_for_offering(&self, key: &OfferingKey) -> StoreResult<Vec<CourseResultRecord>> {
            Ok(lock(&self.results)?
                .iter()
                .filter(|r| r.key == *key)
                .cloned()
                .collect())
        }

        fn results_for_student(&self, matno: &str) -> StoreResult<Vec<CourseResultRecord>> {
            Ok(lock(&self.results)?
                .iter()
                .filter(|r| r.matno == matno)
                .cloned()
                .collect())
        }
    }
}
