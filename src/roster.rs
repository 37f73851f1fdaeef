//! School calendar, students, courses and enrollments: the records the grade
//! logic reads from.

use crate::cache::STUDENT_ROLE;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn parse_iso_date(raw: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| Error::BadParams(format!("{} must be an ISO date (YYYY-MM-DD)", field)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkingPeriod {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub school_year: Option<String>,
    pub start_date: String,
    pub end_date: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_true")]
    pub show_reports: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

pub fn create_marking_period(conn: &Connection, mp: &mut MarkingPeriod) -> Result<()> {
    let name = mp.name.trim();
    if name.is_empty() {
        return Err(Error::BadParams("name must not be empty".into()));
    }
    let start = parse_iso_date(&mp.start_date, "startDate")?;
    let end = parse_iso_date(&mp.end_date, "endDate")?;
    if end < start {
        return Err(Error::BadParams("endDate must not precede startDate".into()));
    }
    if !mp.weight.is_finite() || mp.weight < 0.0 {
        return Err(Error::BadParams("weight must be >= 0".into()));
    }

    mp.id = Uuid::new_v4().to_string();
    mp.name = name.to_string();
    mp.start_date = start.to_string();
    mp.end_date = end.to_string();
    conn.execute(
        "INSERT INTO marking_periods(id, name, school_year, start_date, end_date, weight, show_reports, active)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &mp.id,
            &mp.name,
            &mp.school_year,
            &mp.start_date,
            &mp.end_date,
            mp.weight,
            mp.show_reports as i64,
            mp.active as i64,
        ),
    )?;
    Ok(())
}

pub fn list_marking_periods(conn: &Connection) -> Result<Vec<MarkingPeriod>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, school_year, start_date, end_date, weight, show_reports, active
         FROM marking_periods
         ORDER BY start_date, name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(MarkingPeriod {
                id: r.get(0)?,
                name: r.get(1)?,
                school_year: r.get(2)?,
                start_date: r.get(3)?,
                end_date: r.get(4)?,
                weight: r.get(5)?,
                show_reports: r.get::<_, i64>(6)? != 0,
                active: r.get::<_, i64>(7)? != 0,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub last_name: String,
    pub first_name: String,
    pub display_name: String,
    pub active: bool,
    pub cache_gpa: Option<f64>,
}

pub fn create_student(conn: &Connection, last_name: &str, first_name: &str, active: bool) -> Result<Student> {
    let last = last_name.trim();
    let first = first_name.trim();
    if last.is_empty() {
        return Err(Error::BadParams("lastName must not be empty".into()));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, last_name, first_name, active) VALUES(?, ?, ?, ?)",
        (&id, last, first, active as i64),
    )?;
    Ok(Student {
        id,
        last_name: last.to_string(),
        first_name: first.to_string(),
        display_name: format!("{}, {}", last, first),
        active,
        cache_gpa: None,
    })
}

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    let last: String = r.get(1)?;
    let first: String = r.get(2)?;
    Ok(Student {
        id: r.get(0)?,
        display_name: format!("{}, {}", last, first),
        last_name: last,
        first_name: first,
        active: r.get::<_, i64>(3)? != 0,
        cache_gpa: r.get(4)?,
    })
}

pub fn get_student(conn: &Connection, student_id: &str) -> Result<Student> {
    conn.query_row(
        "SELECT id, last_name, first_name, active, cache_gpa FROM students WHERE id = ?",
        [student_id],
        student_from_row,
    )
    .optional()?
    .ok_or(Error::NotFound("student"))
}

pub fn list_students(conn: &Connection) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, last_name, first_name, active, cache_gpa
         FROM students
         ORDER BY last_name, first_name",
    )?;
    let rows = stmt
        .query_map([], student_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(default)]
    pub id: String,
    pub fullname: String,
    #[serde(default)]
    pub shortname: String,
    #[serde(default)]
    pub credits: f64,
    #[serde(default = "default_true")]
    pub graded: bool,
    #[serde(default)]
    pub marking_period_ids: Vec<String>,
}

pub fn create_course(conn: &Connection, course: &mut Course) -> Result<()> {
    let fullname = course.fullname.trim().to_string();
    if fullname.is_empty() {
        return Err(Error::BadParams("fullname must not be empty".into()));
    }
    if !course.credits.is_finite() || course.credits < 0.0 {
        return Err(Error::BadParams("credits must be >= 0".into()));
    }
    let shortname = match course.shortname.trim() {
        "" => fullname.clone(),
        s => s.to_string(),
    };

    let tx = conn.unchecked_transaction()?;
    let id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO courses(id, fullname, shortname, credits, graded) VALUES(?, ?, ?, ?, ?)",
        (&id, &fullname, &shortname, course.credits, course.graded as i64),
    )?;
    for mp_id in &course.marking_period_ids {
        let exists: Option<i64> = tx
            .query_row("SELECT 1 FROM marking_periods WHERE id = ?", [mp_id], |r| r.get(0))
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound("marking period"));
        }
        tx.execute(
            "INSERT OR IGNORE INTO course_marking_periods(course_id, marking_period_id) VALUES(?, ?)",
            (&id, mp_id),
        )?;
    }
    tx.commit()?;

    course.id = id;
    course.fullname = fullname;
    course.shortname = shortname;
    Ok(())
}

pub fn list_courses(conn: &Connection) -> Result<Vec<Course>> {
    let mut stmt = conn.prepare(
        "SELECT id, fullname, shortname, credits, graded FROM courses ORDER BY fullname",
    )?;
    let mut courses = stmt
        .query_map([], |r| {
            Ok(Course {
                id: r.get(0)?,
                fullname: r.get(1)?,
                shortname: r.get(2)?,
                credits: r.get(3)?,
                graded: r.get::<_, i64>(4)? != 0,
                marking_period_ids: Vec::new(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut mp_stmt = conn.prepare(
        "SELECT cmp.marking_period_id
         FROM course_marking_periods cmp
         JOIN marking_periods mp ON mp.id = cmp.marking_period_id
         WHERE cmp.course_id = ?
         ORDER BY mp.start_date",
    )?;
    for c in &mut courses {
        c.marking_period_ids = mp_stmt
            .query_map([&c.id], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
    }
    Ok(courses)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub course_id: String,
    pub student_id: String,
    pub role: String,
}

pub fn create_enrollment(
    conn: &Connection,
    course_id: &str,
    student_id: &str,
    role: Option<&str>,
) -> Result<Enrollment> {
    get_student(conn, student_id)?;
    let course_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| r.get(0))
        .optional()?;
    if course_exists.is_none() {
        return Err(Error::NotFound("course"));
    }
    let role = role.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(STUDENT_ROLE);

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM course_enrollments WHERE course_id = ? AND student_id = ? AND role = ?",
            (course_id, student_id, role),
            |r| r.get(0),
        )
        .optional()?;
    let id = match existing {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO course_enrollments(id, course_id, student_id, role) VALUES(?, ?, ?, ?)",
                (&id, course_id, student_id, role),
            )?;
            id
        }
    };
    Ok(Enrollment {
        id,
        course_id: course_id.to_string(),
        student_id: student_id.to_string(),
        role: role.to_string(),
    })
}

pub fn list_enrollments(
    conn: &Connection,
    course_id: Option<&str>,
    student_id: Option<&str>,
) -> Result<Vec<Enrollment>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_id, student_id, role
         FROM course_enrollments
         WHERE (?1 IS NULL OR course_id = ?1) AND (?2 IS NULL OR student_id = ?2)
         ORDER BY course_id, student_id",
    )?;
    let rows = stmt
        .query_map((course_id, student_id), |r| {
            Ok(Enrollment {
                id: r.get(0)?,
                course_id: r.get(1)?,
                student_id: r.get(2)?,
                role: r.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
