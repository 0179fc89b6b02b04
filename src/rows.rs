use crate::error::{RowError, RowErrorReason, SchemaError};
use crate::grades;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Students,
    Results,
}

impl ImportKind {
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Self::Students => &["firstname", "lastname", "phone", "email", "matno", "password"],
            Self::Results => &["matno", "score"],
        }
    }
}

/// One data row of a table, keyed by lowercased header name.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub line: usize,
    pub cells: HashMap<String, String>,
}

impl RawRow {
    fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(|s| s.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentRow {
    pub line: usize,
    pub firstname: String,
    pub middlename: Option<String>,
    pub lastname: String,
    pub phone: String,
    pub email: String,
    pub matno: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub line: usize,
    pub matno: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRow {
    Student(StudentRow),
    Result(ResultRow),
}

impl NormalizedRow {
    pub fn line(&self) -> usize {
        match self {
            Self::Student(r) => r.line,
            Self::Result(r) => r.line,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRows {
    pub rows: Vec<NormalizedRow>,
    pub errors: Vec<RowError>,
}

impl ParsedRows {
    pub fn total(&self) -> usize {
        self.rows.len() + self.errors.len()
    }
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                buf.push('"');
                chars.next();
                continue;
            }
            in_quotes = !in_quotes;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(std::mem::take(&mut buf));
            continue;
        }
        buf.push(ch);
    }
    out.push(buf);
    out
}

/// Splits CSV text into records. A line break inside a quoted cell stays in
/// the record. Each record carries the 1-based line it starts on.
fn split_records(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut start = 1;
    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                buf.push(ch);
            }
            '\n' if in_quotes => {
                line += 1;
                buf.push(ch);
            }
            '\n' => {
                line += 1;
                if buf.ends_with('\r') {
                    buf.pop();
                }
                out.push((start, std::mem::take(&mut buf)));
                start = line;
            }
            _ => buf.push(ch),
        }
    }
    if buf.ends_with('\r') {
        buf.pop();
    }
    if !buf.is_empty() {
        out.push((start, buf));
    }
    out
}

/// Reads CSV text into a header-keyed table. Line numbers are 1-based and
/// count the header, so they match what a spreadsheet shows.
pub fn read_table(text: &str) -> Table {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = split_records(text)
        .into_iter()
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Table::default();
    };
    let columns = parse_csv_record(&header)
        .into_iter()
        .map(|s| s.trim().to_ascii_lowercase())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (line, record) in lines {
        let fields = parse_csv_record(&record);
        let mut cells = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if col.is_empty() {
                continue;
            }
            let v = fields.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
            cells.insert(col.clone(), v);
        }
        rows.push(RawRow {
            line,
            cells,
        });
    }

    Table { columns, rows }
}

pub fn check_schema(columns: &[String], kind: ImportKind) -> Result<(), SchemaError> {
    let missing = kind
        .required_columns()
        .iter()
        .filter(|c| !columns.iter().any(|have| have.as_str() == **c))
        .map(|c| c.to_string())
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError { missing })
    }
}

pub fn normalize_matno(s: &str) -> String {
    s.trim().to_ascii_uppercase()
}

pub fn normalize_email(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

pub fn normalize_course(s: &str) -> String {
    s.trim().to_ascii_uppercase()
}

/// Spreadsheets drop the leading zero of 11-digit phone numbers.
pub fn normalize_phone(s: &str) -> String {
    let t = s.trim();
    if t.len() == 10 && t.chars().all(|c| c.is_ascii_digit()) {
        format!("0{}", t)
    } else {
        t.to_string()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

pub fn parse_rows(table: &Table, kind: ImportKind) -> Result<ParsedRows, SchemaError> {
    check_schema(&table.columns, kind)?;

    let mut parsed = ParsedRows::default();
    for raw in &table.rows {
        let missing = kind
            .required_columns()
            .iter()
            .filter(|c| raw.get(c).trim().is_empty())
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            parsed.errors.push(RowError::new(
                raw.line,
                RowErrorReason::MissingField,
                format!("missing {}", missing.join(", ")),
            ));
            continue;
        }

        match kind {
            ImportKind::Students => {
                parsed.rows.push(NormalizedRow::Student(StudentRow {
                    line: raw.line,
                    firstname: raw.get("firstname").trim().to_string(),
                    middlename: non_empty(raw.get("middlename")),
                    lastname: raw.get("lastname").trim().to_string(),
                    phone: normalize_phone(raw.get("phone")),
                    email: normalize_email(raw.get("email")),
                    matno: normalize_matno(raw.get("matno")),
                    password: raw.get("password").trim().to_string(),
                }));
            }
            ImportKind::Results => match grades::parse_score(raw.get("score")) {
                Ok(score) => parsed.rows.push(NormalizedRow::Result(ResultRow {
                    line: raw.line,
                    matno: normalize_matno(raw.get("matno")),
                    score,
                })),
                Err(e) => parsed.errors.push(RowError::new(
                    raw.line,
                    RowErrorReason::InvalidScore,
                    e.to_string(),
                )),
            },
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STUDENTS_CSV: &str = "firstname,lastname,middlename,phone,email,matno,password\n\
        Ada, Obi ,,8031234567,ADA@Example.com,csc/15/001,secret1\n\
        Bola,Ade,Kemi,08031234568,bola@example.com,CSC/15/002,secret2\n\
        Chi,,,08031234569,chi@example.com,csc/15/003,secret3\n";

    #[test]
    fn csv_record_handles_quotes() {
        assert_eq!(
            parse_csv_record(r#"a,"b, c","say ""hi""",,"#),
            vec!["a", "b, c", "say \"hi\"", "", ""]
        );
    }

    #[test]
    fn read_table_lowercases_header_and_skips_blank_lines() {
        let t = read_table("\u{feff}MatNo, Score\r\n\r\ncsc1,70\r\n");
        assert_eq!(t.columns, vec!["matno", "score"]);
        assert_eq!(t.rows.len(), 1);
        assert_eq!(t.rows[0].line, 3);
        assert_eq!(t.rows[0].cells.get("score").map(|s| s.as_str()), Some("70"));
    }

    #[test]
    fn quoted_line_breaks_stay_in_the_cell() {
        let t = read_table("matno,score,note\r\ncsc1,70,\"two\r\nlines\"\r\ncsc2,55,\"a \"\"b\"\"\"\r\n");
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[0].line, 2);
        assert_eq!(
            t.rows[0].cells.get("note").map(|s| s.as_str()),
            Some("two\r\nlines")
        );
        assert_eq!(t.rows[1].line, 4);
        assert_eq!(t.rows[1].cells.get("matno").map(|s| s.as_str()), Some("csc2"));
        assert_eq!(t.rows[1].cells.get("note").map(|s| s.as_str()), Some("a \"b\""));
    }

    #[test]
    fn short_rows_get_empty_cells() {
        let t = read_table("matno,score\nCSC1\n");
        assert_eq!(t.rows[0].cells.get("score").map(|s| s.as_str()), Some(""));
    }

    #[test]
    fn missing_columns_fail_the_batch() {
        let t = read_table("matno,grade\nCSC1,A\n");
        let e = parse_rows(&t, ImportKind::Results).expect_err("schema error");
        assert_eq!(e.missing, vec!["score".to_string()]);

        let empty = read_table("");
        let e = parse_rows(&empty, ImportKind::Students).expect_err("schema error");
        assert_eq!(e.missing.len(), 6);
    }

    #[test]
    fn header_only_table_parses_to_nothing() {
        let t = read_table("matno,score\n");
        let parsed = parse_rows(&t, ImportKind::Results).expect("parse");
        assert_eq!(parsed.total(), 0);
    }

    #[test]
    fn student_rows_are_normalized() {
        let t = read_table(STUDENTS_CSV);
        let parsed = parse_rows(&t, ImportKind::Students).expect("parse");
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].line, 4);
        assert_eq!(parsed.errors[0].reason, RowErrorReason::MissingField);

        let NormalizedRow::Student(first) = &parsed.rows[0] else {
            panic!("expected student row");
        };
        assert_eq!(first.lastname, "Obi");
        assert_eq!(first.middlename, None);
        assert_eq!(first.phone, "08031234567");
        assert_eq!(first.email, "ada@example.com");
        assert_eq!(first.matno, "CSC/15/001");

        let NormalizedRow::Student(second) = &parsed.rows[1] else {
            panic!("expected student row");
        };
        assert_eq!(second.middlename.as_deref(), Some("Kemi"));
        assert_eq!(second.phone, "08031234568");
    }

    #[test]
    fn phone_padding_only_applies_to_ten_digits() {
        assert_eq!(normalize_phone("8031234567"), "08031234567");
        assert_eq!(normalize_phone("803123456"), "803123456");
        assert_eq!(normalize_phone("+234803123456"), "+234803123456");
        assert_eq!(normalize_phone("803-123-456"), "803-123-456");
    }

    #[test]
    fn result_rows_flag_bad_scores() {
        let t = read_table("matno,score\ncsc1,71\ncsc2,abs\n,50\ncsc4, 39.5 \n");
        let parsed = parse_rows(&t, ImportKind::Results).expect("parse");
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.errors.len(), 2);
        assert_eq!(parsed.errors[0].reason, RowErrorReason::InvalidScore);
        assert_eq!(parsed.errors[1].reason, RowErrorReason::MissingField);
        assert_eq!(
            parsed.rows[1],
            NormalizedRow::Result(ResultRow {
                line: 5,
                matno: "CSC4".to_string(),
                score: 39.5,
            })
        );
    }
}
