use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("open {}", db_path.display()))?;
    init_schema(&conn).context("initialize schema")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marking_periods(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            school_year TEXT,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 1,
            show_reports INTEGER NOT NULL DEFAULT 1,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            cache_gpa REAL
        )",
        [],
    )?;
    ensure_students_cache_gpa(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            fullname TEXT NOT NULL,
            shortname TEXT NOT NULL,
            credits REAL NOT NULL DEFAULT 0,
            graded INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_marking_periods(
            course_id TEXT NOT NULL,
            marking_period_id TEXT NOT NULL,
            PRIMARY KEY(course_id, marking_period_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(marking_period_id) REFERENCES marking_periods(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_enrollments(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'student',
            cached_grade TEXT,
            grade_stale INTEGER NOT NULL DEFAULT 1,
            cached_numeric_grade REAL,
            numeric_grade_stale INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(course_id, student_id, role)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_enrollments_student ON course_enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            marking_period_id TEXT,
            date TEXT NOT NULL,
            grade REAL,
            override_final INTEGER NOT NULL DEFAULT 0,
            comment TEXT NOT NULL DEFAULT '',
            letter_grade TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(marking_period_id) REFERENCES marking_periods(id)
        )",
        [],
    )?;
    // NULL marking periods are distinct under a plain UNIQUE constraint, so the
    // key is enforced on a coalesced expression instead.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_grades_key
         ON grades(student_id, course_id, COALESCE(marking_period_id, ''))",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student_mp ON grades(student_id, marking_period_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_marking_period_grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            marking_period_id TEXT NOT NULL,
            grade REAL,
            grade_stale INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(marking_period_id) REFERENCES marking_periods(id),
            UNIQUE(student_id, marking_period_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_comments(
            id INTEGER PRIMARY KEY,
            comment TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cohorts(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            course_id TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cohort_students(
            cohort_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(cohort_id, student_id),
            FOREIGN KEY(cohort_id) REFERENCES cohorts(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS benchmarks(
            id TEXT PRIMARY KEY,
            number TEXT NOT NULL,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS gradebook_categories(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_types(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS items(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            name TEXT NOT NULL,
            date TEXT,
            description TEXT,
            marking_period_id TEXT,
            category_id TEXT,
            points_possible REAL,
            assignment_type_id TEXT,
            benchmark_id TEXT,
            multiplier REAL NOT NULL DEFAULT 1,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(marking_period_id) REFERENCES marking_periods(id),
            FOREIGN KEY(category_id) REFERENCES gradebook_categories(id),
            FOREIGN KEY(assignment_type_id) REFERENCES assignment_types(id),
            FOREIGN KEY(benchmark_id) REFERENCES benchmarks(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_items_course ON items(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS demonstrations(
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(item_id) REFERENCES items(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            demonstration_id TEXT,
            student_id TEXT NOT NULL,
            mark REAL,
            normalized_mark REAL,
            description TEXT,
            FOREIGN KEY(item_id) REFERENCES items(id),
            FOREIGN KEY(demonstration_id) REFERENCES demonstrations(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_marks_key
         ON marks(item_id, COALESCE(demonstration_id, ''), student_id)",
        [],
    )?;

    Ok(())
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

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn ensure_students_cache_gpa(conn: &Connection) -> anyhow::Result<()> {
    // Workspaces created before GPA caching have no cache column.
    if table_has_column(conn, "students", "cache_gpa")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN cache_gpa REAL", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "students", "cache_gpa").expect("pragma"));
    }

    #[test]
    fn grade_key_rejects_duplicate_null_marking_period() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("init");
        conn.execute(
            "INSERT INTO students(id, last_name, first_name) VALUES('s1', 'Doe', 'Jo')",
            [],
        )
        .expect("student");
        conn.execute(
            "INSERT INTO courses(id, fullname, shortname) VALUES('c1', 'Algebra', 'ALG')",
            [],
        )
        .expect("course");
        conn.execute(
            "INSERT INTO grades(id, student_id, course_id, date) VALUES('g1', 's1', 'c1', '2024-01-01')",
            [],
        )
        .expect("first grade");
        let dup = conn.execute(
            "INSERT INTO grades(id, student_id, course_id, date) VALUES('g2', 's1', 'c1', '2024-01-01')",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn settings_roundtrip_overwrites() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("init");
        assert!(settings_get_json(&conn, "k").expect("get").is_none());
        settings_set_json(&conn, "k", &serde_json::json!("a")).expect("set");
        settings_set_json(&conn, "k", &serde_json::json!("b")).expect("set");
        assert_eq!(
            settings_get_json(&conn, "k").expect("get"),
            Some(serde_json::json!("b"))
        );
    }
}
