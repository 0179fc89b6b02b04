use crate::academic::{Semester, TermKey};
use crate::grades::{round_off_2_decimal, GradeScale};
use crate::store::{CourseResultRecord, RecordStore, StoreResult};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterGroup {
    pub session: String,
    pub semester: Semester,
    pub results: Vec<CourseResultRecord>,
    pub total_credits: u32,
    pub gpa: f64,
    /// Weighted over this group and every earlier one.
    pub cumulative_gpa: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub matno: String,
    pub semesters: Vec<SemesterGroup>,
    pub total_credits: u32,
    pub cgpa: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Weighted {
    points: f64,
    credits: u32,
}

impl Weighted {
    fn add(&mut self, points: f64, credit: u32) {
        self.points += points * f64::from(credit);
        self.credits += credit;
    }

    fn absorb(&mut self, other: Weighted) {
        self.points += other.points;
        self.credits += other.credits;
    }

    fn gpa(self) -> f64 {
        if self.credits == 0 {
            0.0
        } else {
            round_off_2_decimal(self.points / f64::from(self.credits))
        }
    }
}

fn points_for(result: &CourseResultRecord, scale: &GradeScale) -> f64 {
    if let Some(p) = scale.points_of(&result.grade) {
        return p;
    }
    // Grade letter from an older scale: regrade from the stored score.
    match scale.grade_of(result.score).map(|g| scale.points_of(g)) {
        Ok(Some(p)) => p,
        _ => {
            warn!(
                matno = %result.matno,
                course = %result.key.course,
                grade = %result.grade,
                "result has no grade points under the current scale"
            );
            0.0
        }
    }
}

/// Groups one student's results by `(session, semester)` in chronological
/// order and computes per-group and cumulative GPA.
pub fn build_transcript(
    matno: &str,
    results: Vec<CourseResultRecord>,
    scale: &GradeScale,
) -> Transcript {
    let mut groups: BTreeMap<TermKey, (String, Semester, Vec<CourseResultRecord>)> =
        BTreeMap::new();
    for r in results {
        groups
            .entry(TermKey::new(&r.key.session, r.key.semester))
            .or_insert_with(|| (r.key.session.clone(), r.key.semester, Vec::new()))
            .2
            .push(r);
    }

    let mut running = Weighted::default();
    let mut semesters = Vec::with_capacity(groups.len());
    for (_, (session, semester, mut results)) in groups {
        results.sort_by(|a, b| a.key.course.cmp(&b.key.course));
        let mut group = Weighted::default();
        for r in &results {
            group.add(points_for(r, scale), r.credit);
        }
        running.absorb(group);
        semesters.push(SemesterGroup {
            session,
            semester,
            results,
            total_credits: group.credits,
            gpa: group.gpa(),
            cumulative_gpa: running.gpa(),
        });
    }

    Transcript {
        matno: matno.to_string(),
        semesters,
        total_credits: running.credits,
        cgpa: running.gpa(),
    }
}

pub fn transcript_for<S: RecordStore + ?Sized>(
    store: &S,
    matno: &str,
    scale: &GradeScale,
) -> StoreResult<Transcript> {
    let results = store.results_for_student(matno)?;
    Ok(build_transcript(matno, results, scale))
}
