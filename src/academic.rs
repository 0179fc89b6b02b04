use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Level {
    L100,
    L200,
    L300,
    L400,
    L500,
    L600,
}

impl Level {
    /// Accepts `300`, `300L` and `300l`.
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        let t = t
            .strip_suffix('L')
            .or_else(|| t.strip_suffix('l'))
            .unwrap_or(t)
            .trim();
        match t {
            "100" => Some(Self::L100),
            "200" => Some(Self::L200),
            "300" => Some(Self::L300),
            "400" => Some(Self::L400),
            "500" => Some(Self::L500),
            "600" => Some(Self::L600),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::L100 => "100",
            Self::L200 => "200",
            Self::L300 => "300",
            Self::L400 => "400",
            Self::L500 => "500",
            Self::L600 => "600",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Level {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Level::parse(&s).ok_or_else(|| format!("unknown level: {}", s))
    }
}

impl From<Level> for String {
    fn from(l: Level) -> Self {
        l.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Semester {
    First,
    Second,
}

impl Semester {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "1" | "1st" => Some(Self::First),
            "second" | "2" | "2nd" => Some(Self::Second),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Second => "second",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Semester {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Semester::parse(&s).ok_or_else(|| format!("unknown semester: {}", s))
    }
}

impl From<Semester> for String {
    fn from(s: Semester) -> Self {
        s.as_str().to_string()
    }
}

/// Chronological ordering key for a `(session, semester)` pair.
///
/// Sessions look like `2019/2020` (also `2019-2020` or a bare `2019`).
/// Anything else sorts after every parsed session, by raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermKey {
    years: Option<(u32, u32)>,
    raw: String,
    semester: u8,
}

impl TermKey {
    pub fn new(session: &str, semester: Semester) -> Self {
        Self {
            years: parse_session_years(session),
            raw: session.trim().to_string(),
            semester: semester.rank(),
        }
    }
}

impl Ord for TermKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_years = match (&self.years, &other.years) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.raw.cmp(&other.raw),
        };
        by_years
            .then_with(|| self.semester.cmp(&other.semester))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for TermKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_year(s: &str) -> Option<u32> {
    let t = s.trim();
    if t.len() != 4 || !t.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    t.parse::<u32>().ok()
}

fn parse_session_years(session: &str) -> Option<(u32, u32)> {
    let t = session.trim();
    let parts: Vec<&str> = t.split(|c| c == '/' || c == '-').collect();
    match parts.as_slice() {
        [single] => parse_year(single).map(|y| (y, y + 1)),
        [start, end] => {
            let start = parse_year(start)?;
            let end = parse_year(end)?;
            if end < start {
                return None;
            }
            Some((start, end))
        }
        _ => None,
    }
}
