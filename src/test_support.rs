use crate::roster::{self, Course, MarkingPeriod};
use rusqlite::Connection;

pub fn conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    crate::db::init_schema(&conn).expect("init schema");
    conn
}

pub fn marking_period(conn: &Connection, name: &str, start: &str, weight: f64) -> String {
    let mut mp = MarkingPeriod {
        id: String::new(),
        name: name.to_string(),
        school_year: Some("2024-2025".to_string()),
        start_date: start.to_string(),
        end_date: start.to_string(),
        weight,
        show_reports: true,
        active: true,
    };
    roster::create_marking_period(conn, &mut mp).expect("create marking period");
    mp.id
}

pub fn course(conn: &Connection, name: &str, credits: f64, mps: &[&str]) -> String {
    let mut c = Course {
        id: String::new(),
        fullname: name.to_string(),
        shortname: String::new(),
        credits,
        graded: true,
        marking_period_ids: mps.iter().map(|s| s.to_string()).collect(),
    };
    roster::create_course(conn, &mut c).expect("create course");
    c.id
}

pub fn student(conn: &Connection, last: &str) -> String {
    roster::create_student(conn, last, "Test", true)
        .expect("create student")
        .id
}

pub fn enroll(conn: &Connection, course_id: &str, student_id: &str) -> String {
    roster::create_enrollment(conn, course_id, student_id, None)
        .expect("enroll")
        .id
}
