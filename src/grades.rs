use crate::error::{InvalidScore, ScaleError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBand {
    pub min_score: f64,
    pub grade: String,
    pub points: f64,
}

impl GradeBand {
    fn new(min_score: f64, grade: &str, points: f64) -> Self {
        Self {
            min_score,
            grade: grade.to_string(),
            points,
        }
    }
}

/// Ordered score bands. Held sorted by descending `min_score`; the last band
/// always starts at 0, so `grade_of` is total over [0, 100].
#[derive(Debug, Clone, PartialEq)]
pub struct GradeScale {
    bands: Vec<GradeBand>,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self::reference()
    }
}

impl GradeScale {
    /// A ≥70, B 60–69, C 50–59, D 45–49, E 40–44, F below 40.
    pub fn reference() -> Self {
        Self {
            bands: reference_bands(),
        }
    }

    pub fn new(mut bands: Vec<GradeBand>) -> Result<Self, ScaleError> {
        if bands.is_empty() {
            return Err(ScaleError::Empty);
        }
        for (index, b) in bands.iter_mut().enumerate() {
            let bad = |message: &str| ScaleError::BadBand {
                index,
                message: message.to_string(),
            };
            b.grade = b.grade.trim().to_ascii_uppercase();
            if b.grade.is_empty() {
                return Err(bad("grade must not be empty"));
            }
            if !b.min_score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&b.min_score) {
                return Err(bad("minScore must be within 0..=100"));
            }
            if !b.points.is_finite() || b.points < 0.0 {
                return Err(bad("points must be a non-negative number"));
            }
        }
        bands.sort_by(|a, b| {
            b.min_score
                .partial_cmp(&a.min_score)
                .unwrap_or(Ordering::Equal)
        });
        for (index, pair) in bands.windows(2).enumerate() {
            if pair[0].min_score == pair[1].min_score {
                return Err(ScaleError::BadBand {
                    index: index + 1,
                    message: format!("duplicate minScore {}", pair[1].min_score),
                });
            }
        }
        for (index, b) in bands.iter().enumerate() {
            if bands[..index].iter().any(|prev| prev.grade == b.grade) {
                return Err(ScaleError::BadBand {
                    index,
                    message: format!("duplicate grade {}", b.grade),
                });
            }
        }
        if bands.last().map(|b| b.min_score) != Some(MIN_SCORE) {
            return Err(ScaleError::NotTotal);
        }
        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    pub fn grade_of(&self, score: f64) -> Result<&str, InvalidScore> {
        if !score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(InvalidScore(score.to_string()));
        }
        self.bands
            .iter()
            .find(|b| score >= b.min_score)
            .map(|b| b.grade.as_str())
            .ok_or_else(|| InvalidScore(score.to_string()))
    }

    pub fn points_of(&self, grade: &str) -> Option<f64> {
        let g = grade.trim();
        self.bands
            .iter()
            .find(|b| b.grade.eq_ignore_ascii_case(g))
            .map(|b| b.points)
    }
}

pub fn reference_bands() -> Vec<GradeBand> {
    vec![
        GradeBand::new(70.0, "A", 5.0),
        GradeBand::new(60.0, "B", 4.0),
        GradeBand::new(50.0, "C", 3.0),
        GradeBand::new(45.0, "D", 2.0),
        GradeBand::new(40.0, "E", 1.0),
        GradeBand::new(0.0, "F", 0.0),
    ]
}

/// Parses a score cell. Range checks belong to `GradeScale::grade_of`.
pub fn parse_score(raw: &str) -> Result<f64, InvalidScore> {
    let t = raw.trim();
    match t.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(InvalidScore(t.to_string())),
    }
}

/// Half-up rounding to two decimals: `Int(100*x + 0.5) / 100`.
pub fn round_off_2_decimal(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}
