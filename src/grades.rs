use crate::error::{Error, Result};
use crate::comments::GRADE_COMMENT_MAX_CHARS;
use crate::{cache, config};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Numeric grades are stored with two decimal places and at most five digits.
pub const GRADE_DECIMAL_PLACES: u32 = 2;
const GRADE_ABS_LIMIT: f64 = 1000.0;

/// Half-up rounding to `places` decimals, `Int(x * 10^n + 0.5) / 10^n`.
pub fn round_off(x: f64, places: u32) -> f64 {
    let f = 10_f64.powi(places as i32);
    ((x * f) + 0.5).floor() / f
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LetterGrade {
    #[serde(rename = "I")]
    Incomplete,
    #[serde(rename = "P")]
    Pass,
    #[serde(rename = "F")]
    Fail,
    A,
    B,
    C,
    D,
    #[serde(rename = "HP")]
    HighPass,
    #[serde(rename = "LP")]
    LowPass,
    #[serde(rename = "M")]
    Missing,
}

/// How a letter grade takes part in calculations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterBehavior {
    /// Normalized (0..=1) value used in averages, if any.
    pub normalized: Option<f64>,
    /// The letter replaces the whole average when present.
    pub dominates: bool,
}

impl LetterGrade {
    pub const ALL: [LetterGrade; 10] = [
        LetterGrade::Incomplete,
        LetterGrade::Pass,
        LetterGrade::Fail,
        LetterGrade::A,
        LetterGrade::B,
        LetterGrade::C,
        LetterGrade::D,
        LetterGrade::HighPass,
        LetterGrade::LowPass,
        LetterGrade::Missing,
    ];

    pub fn code(self) -> &'static str {
        match self {
            LetterGrade::Incomplete => "I",
            LetterGrade::Pass => "P",
            LetterGrade::Fail => "F",
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::HighPass => "HP",
            LetterGrade::LowPass => "LP",
            LetterGrade::Missing => "M",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            LetterGrade::Incomplete => "Incomplete",
            LetterGrade::Pass => "Pass",
            LetterGrade::Fail => "Fail",
            LetterGrade::A => "A",
            LetterGrade::B => "B",
            LetterGrade::C => "C",
            LetterGrade::D => "D",
            LetterGrade::HighPass => "High Pass",
            LetterGrade::LowPass => "Low Pass",
            LetterGrade::Missing => "Missing",
        }
    }

    /// Case-insensitive match against the choice codes.
    pub fn parse(token: &str) -> Option<Self> {
        let t = token.trim().to_uppercase();
        Self::ALL.iter().copied().find(|g| g.code() == t)
    }

    /// A-D carry no calculation behavior and are skipped.
    pub fn behavior(self) -> Option<LetterBehavior> {
        let (normalized, dominates) = match self {
            LetterGrade::Incomplete => (None, true),
            LetterGrade::Pass => (Some(1.0), false),
            LetterGrade::Fail => (Some(0.0), false),
            LetterGrade::HighPass => (Some(1.0), false),
            LetterGrade::LowPass => (Some(1.0), false),
            LetterGrade::Missing => (Some(0.0), false),
            LetterGrade::A | LetterGrade::B | LetterGrade::C | LetterGrade::D => return None,
        };
        Some(LetterBehavior {
            normalized,
            dominates,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetGradeOptions {
    /// Return the spelled-out letter grade instead of its code.
    pub display: bool,
    /// Format numeric grades to this many decimal places.
    pub rounding: Option<usize>,
    /// Numeric grades below this are raised to it.
    pub minimum: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GradeDisplay {
    Letter(&'static str),
    Number(f64),
    Formatted(String),
    Empty(&'static str),
}

impl fmt::Display for GradeDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeDisplay::Letter(s) | GradeDisplay::Empty(s) => f.write_str(s),
            GradeDisplay::Number(v) => write!(f, "{}", v),
            GradeDisplay::Formatted(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: Option<String>,
    pub student_id: String,
    pub course_id: String,
    pub marking_period_id: Option<String>,
    pub date: Option<String>,
    pub grade: Option<f64>,
    pub override_final: bool,
    pub comment: String,
    pub letter_grade: Option<LetterGrade>,
}

impl Grade {
    pub fn new(student_id: &str, course_id: &str, marking_period_id: Option<&str>) -> Self {
        Self {
            id: None,
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
            marking_period_id: marking_period_id.map(str::to_string),
            date: None,
            grade: None,
            override_final: false,
            comment: String::new(),
            letter_grade: None,
        }
    }

    /// Set either a numeric or a letter grade from user input.
    ///
    /// Numbers below 1 are taken as fractions and scaled to a percentage.
    /// Letters match the choice codes case-insensitively. A blank value
    /// clears both. Returns false (leaving the record untouched) when the
    /// input is neither.
    pub fn set_grade(&mut self, raw: &str) -> bool {
        let token = raw.trim();
        if let Ok(mut v) = token.parse::<f64>() {
            if !v.is_finite() {
                return false;
            }
            if v < 1.0 {
                v *= 100.0;
            }
            let rounded = round_off(v, GRADE_DECIMAL_PLACES);
            if !rounded.is_finite() {
                return false;
            }
            self.grade = Some(rounded);
            self.letter_grade = None;
            return true;
        }
        if let Some(letter) = LetterGrade::parse(token) {
            self.letter_grade = Some(letter);
            self.grade = None;
            return true;
        }
        if token.is_empty() {
            self.grade = None;
            self.letter_grade = None;
            return true;
        }
        false
    }

    pub fn get_grade(&self, opts: &GetGradeOptions) -> GradeDisplay {
        if let Some(letter) = self.letter_grade {
            return if opts.display {
                GradeDisplay::Letter(letter.display_name())
            } else {
                GradeDisplay::Letter(letter.code())
            };
        }
        let Some(mut grade) = self.grade else {
            return GradeDisplay::Empty("");
        };
        if let Some(min) = opts.minimum {
            if grade < min {
                grade = min;
            }
        }
        match opts.rounding {
            Some(places) => GradeDisplay::Formatted(format!("{:.*}", places, grade)),
            None => GradeDisplay::Number(grade),
        }
    }

    /// Spelled-out grade such as "Fail", "Pass", 60.05 or "B".
    pub fn display_grade(&self) -> GradeDisplay {
        self.get_grade(&GetGradeOptions {
            display: true,
            ..Default::default()
        })
    }

    /// The comment is held to the configured limit, never above the
    /// column maximum.
    pub fn clean(&self, comment_limit: usize) -> Result<()> {
        let comment_limit = comment_limit.min(GRADE_COMMENT_MAX_CHARS);
        if self.grade.is_some() && self.letter_grade.is_some() {
            return Err(Error::Validation(
                "Cannot have both numeric and letter grade.".into(),
            ));
        }
        if let Some(g) = self.grade {
            if !g.is_finite() || g.abs() >= GRADE_ABS_LIMIT {
                return Err(Error::Validation(format!(
                    "grade {} does not fit in 5 digits with 2 decimal places",
                    g
                )));
            }
        }
        let comment_len = self.comment.chars().count();
        if comment_len > comment_limit {
            return Err(Error::Validation(format!(
                "Ensure this value has at most {} characters (it has {}).",
                comment_limit, comment_len
            )));
        }
        Ok(())
    }
}

const GRADE_COLUMNS: &str = "id, student_id, course_id, marking_period_id, date, grade, override_final, comment, letter_grade";

fn grade_from_row(r: &Row<'_>) -> rusqlite::Result<Grade> {
    let letter: Option<String> = r.get(8)?;
    Ok(Grade {
        id: Some(r.get(0)?),
        student_id: r.get(1)?,
        course_id: r.get(2)?,
        marking_period_id: r.get(3)?,
        date: r.get(4)?,
        grade: r.get(5)?,
        override_final: r.get::<_, i64>(6)? != 0,
        comment: r.get(7)?,
        // Unknown codes in storage read back as "no letter grade".
        letter_grade: letter.as_deref().and_then(LetterGrade::parse),
    })
}

pub fn get_by_id(conn: &Connection, grade_id: &str) -> Result<Option<Grade>> {
    let sql = format!("SELECT {GRADE_COLUMNS} FROM grades WHERE id = ?");
    Ok(conn
        .query_row(&sql, [grade_id], grade_from_row)
        .optional()?)
}

pub fn find(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    marking_period_id: Option<&str>,
) -> Result<Option<Grade>> {
    let sql = format!(
        "SELECT {GRADE_COLUMNS} FROM grades
         WHERE student_id = ? AND course_id = ? AND marking_period_id IS ?"
    );
    Ok(conn
        .query_row(
            &sql,
            (student_id, course_id, marking_period_id),
            grade_from_row,
        )
        .optional()?)
}

#[derive(Debug, Clone, Default)]
pub struct GradeFilter {
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub marking_period_id: Option<String>,
}

pub fn list(conn: &Connection, filter: &GradeFilter) -> Result<Vec<Grade>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(v) = &filter.student_id {
        clauses.push("student_id = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &filter.course_id {
        clauses.push("course_id = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &filter.marking_period_id {
        clauses.push("marking_period_id = ?");
        binds.push(Value::Text(v.clone()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {GRADE_COLUMNS} FROM grades {where_sql}
         ORDER BY student_id, course_id, marking_period_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), grade_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn require_exists(conn: &Connection, table: &str, id: &str, what: &'static str) -> Result<()> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    if found.is_none() {
        return Err(Error::NotFound(what));
    }
    Ok(())
}

/// Validate and persist a grade, then invalidate the caches derived from it.
///
/// The grade's `id` and `date` are filled in on success.
pub fn save(conn: &Connection, grade: &mut Grade) -> Result<()> {
    let limit = config::grade_comment_length_limit(conn)?;
    grade.clean(limit)?;
    require_exists(conn, "students", &grade.student_id, "student")?;
    require_exists(conn, "courses", &grade.course_id, "course")?;
    if let Some(mp) = &grade.marking_period_id {
        require_exists(conn, "marking_periods", mp, "marking period")?;
    }

    let tx = conn.unchecked_transaction()?;

    let existing_id = match &grade.id {
        Some(id) => Some(id.clone()),
        None => find(
            &tx,
            &grade.student_id,
            &grade.course_id,
            grade.marking_period_id.as_deref(),
        )?
        .and_then(|g| g.id),
    };
    let today = chrono::Local::now().date_naive().to_string();
    let letter = grade.letter_grade.map(LetterGrade::code);

    let id = match existing_id {
        Some(id) => {
            let changed = tx.execute(
                "UPDATE grades SET
                   student_id = ?, course_id = ?, marking_period_id = ?, date = ?,
                   grade = ?, override_final = ?, comment = ?, letter_grade = ?
                 WHERE id = ?",
                (
                    &grade.student_id,
                    &grade.course_id,
                    &grade.marking_period_id,
                    &today,
                    grade.grade,
                    grade.override_final as i64,
                    &grade.comment,
                    letter,
                    &id,
                ),
            )?;
            if changed == 0 {
                return Err(Error::NotFound("grade"));
            }
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO grades(id, student_id, course_id, marking_period_id, date,
                                    grade, override_final, comment, letter_grade)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &grade.student_id,
                    &grade.course_id,
                    &grade.marking_period_id,
                    &today,
                    grade.grade,
                    grade.override_final as i64,
                    &grade.comment,
                    letter,
                ),
            )?;
            id
        }
    };

    grade.id = Some(id);
    grade.date = Some(today);
    cache::invalidate_for_grade(&tx, grade)?;
    tx.commit()?;

    tracing::debug!(
        grade_id = grade.id.as_deref().unwrap_or(""),
        student_id = %grade.student_id,
        course_id = %grade.course_id,
        "grade saved"
    );
    Ok(())
}

/// Delete a grade and invalidate its caches. Returns the removed record.
pub fn delete(conn: &Connection, grade_id: &str) -> Result<Grade> {
    let tx = conn.unchecked_transaction()?;
    let Some(grade) = get_by_id(&tx, grade_id)? else {
        return Err(Error::NotFound("grade"));
    };
    tx.execute("DELETE FROM grades WHERE id = ?", [grade_id])?;
    cache::invalidate_for_grade(&tx, &grade)?;
    tx.commit()?;
    tracing::debug!(grade_id, student_id = %grade.student_id, "grade deleted");
    Ok(grade)
}
