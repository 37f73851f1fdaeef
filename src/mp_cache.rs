use crate::error::{Error, Result};
use crate::grades::{round_off, GRADE_DECIMAL_PLACES};
use crate::cache::STUDENT_ROLE;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

/// Memoized marking-period average for one student.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMarkingPeriodGrade {
    pub id: String,
    pub student_id: String,
    pub marking_period_id: String,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub created: usize,
    pub existing: usize,
}

/// Ensure a cache row exists for every student and every marking period of
/// a course the student is enrolled in. Safe to repeat.
pub fn build_all_cache(conn: &Connection) -> Result<BuildSummary> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT ce.student_id, cmp.marking_period_id
         FROM course_enrollments ce
         JOIN course_marking_periods cmp ON cmp.course_id = ce.course_id
         WHERE ce.role = ?
         ORDER BY ce.student_id, cmp.marking_period_id",
    )?;
    let pairs = stmt
        .query_map([STUDENT_ROLE], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let tx = conn.unchecked_transaction()?;
    let mut summary = BuildSummary::default();
    for (student_id, mp_id) in pairs {
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO student_marking_period_grades(id, student_id, marking_period_id, grade, grade_stale)
             VALUES(?, ?, ?, NULL, 1)",
            (Uuid::new_v4().to_string(), &student_id, &mp_id),
        )?;
        if inserted > 0 {
            summary.created += 1;
        } else {
            summary.existing += 1;
        }
    }
    tx.commit()?;
    tracing::info!(
        created = summary.created,
        existing = summary.existing,
        "marking period grade cache built"
    );
    Ok(summary)
}

/// `AVG(grade * weight)` over the student's plain numeric grades in the
/// marking period. Overridden and letter grades are left out.
pub fn calculate_grade(
    conn: &Connection,
    student_id: &str,
    marking_period_id: &str,
) -> Result<Option<f64>> {
    let avg: Option<f64> = conn.query_row(
        "SELECT AVG(g.grade * mp.weight)
         FROM grades g
         JOIN marking_periods mp ON mp.id = g.marking_period_id
         WHERE g.student_id = ? AND g.marking_period_id = ?
           AND g.letter_grade IS NULL
           AND g.grade IS NOT NULL
           AND g.override_final = 0",
        (student_id, marking_period_id),
        |r| r.get(0),
    )?;
    Ok(avg.map(|v| round_off(v, GRADE_DECIMAL_PLACES)))
}

pub fn flag_stale(conn: &Connection, student_id: &str, marking_period_id: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE student_marking_period_grades SET grade_stale = 1
         WHERE student_id = ? AND marking_period_id = ?",
        (student_id, marking_period_id),
    )?;
    Ok(changed > 0)
}

fn refresh_if_stale(
    conn: &Connection,
    id: String,
    student_id: String,
    marking_period_id: String,
    grade: Option<f64>,
    stale: bool,
) -> Result<StudentMarkingPeriodGrade> {
    let grade = if stale {
        let fresh = calculate_grade(conn, &student_id, &marking_period_id)?;
        conn.execute(
            "UPDATE student_marking_period_grades SET grade = ?, grade_stale = 0 WHERE id = ?",
            (fresh, &id),
        )?;
        fresh
    } else {
        grade
    };
    Ok(StudentMarkingPeriodGrade {
        id,
        student_id,
        marking_period_id,
        grade,
    })
}

/// Read a cached marking-period average, recomputing it when stale.
pub fn get(
    conn: &Connection,
    student_id: &str,
    marking_period_id: &str,
) -> Result<StudentMarkingPeriodGrade> {
    let row: Option<(String, Option<f64>, bool)> = conn
        .query_row(
            "SELECT id, grade, grade_stale FROM student_marking_period_grades
             WHERE student_id = ? AND marking_period_id = ?",
            (student_id, marking_period_id),
            |r| Ok((r.get(0)?, r.get(1)?, r.get::<_, i64>(2)? != 0)),
        )
        .optional()?;
    let Some((id, grade, stale)) = row else {
        return Err(Error::NotFound("marking period grade"));
    };
    refresh_if_stale(
        conn,
        id,
        student_id.to_string(),
        marking_period_id.to_string(),
        grade,
        stale,
    )
}

pub fn list_for_student(conn: &Connection, student_id: &str) -> Result<Vec<StudentMarkingPeriodGrade>> {
    let mut stmt = conn.prepare(
        "SELECT smpg.id, smpg.marking_period_id, smpg.grade, smpg.grade_stale
         FROM student_marking_period_grades smpg
         JOIN marking_periods mp ON mp.id = smpg.marking_period_id
         WHERE smpg.student_id = ?
         ORDER BY mp.start_date, mp.name",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<f64>>(2)?,
                r.get::<_, i64>(3)? != 0,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    drop(stmt);

    rows.into_iter()
        .map(|(id, mp_id, grade, stale)| {
            refresh_if_stale(conn, id, student_id.to_string(), mp_id, grade, stale)
        })
        .collect()
}
