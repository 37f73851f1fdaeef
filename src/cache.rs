//! Derived grade caches: course-enrollment final grades, student GPA, and the
//! invalidation hook run whenever a grade row changes.

use crate::error::{Error, Result};
use crate::grades::{round_off, Grade, LetterGrade, GRADE_DECIMAL_PLACES};
use crate::mp_cache;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

pub const STUDENT_ROLE: &str = "student";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnrollmentGrade {
    Letter(LetterGrade),
    Numeric(f64),
}

impl EnrollmentGrade {
    fn cache_text(self) -> String {
        match self {
            EnrollmentGrade::Letter(l) => l.code().to_string(),
            EnrollmentGrade::Numeric(v) => format!("{:.2}", v),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentGradeView {
    pub enrollment_id: String,
    pub course_id: String,
    pub student_id: String,
    pub grade: Option<String>,
    pub numeric_grade: Option<f64>,
    pub recomputed: bool,
}

/// Flag both cached grade fields of the (course, student) enrollment stale.
/// Returns false when the student has no enrollment in the course.
pub fn flag_enrollment_stale(conn: &Connection, course_id: &str, student_id: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE course_enrollments
         SET grade_stale = 1, numeric_grade_stale = 1
         WHERE course_id = ? AND student_id = ? AND role = ?",
        (course_id, student_id, STUDENT_ROLE),
    )?;
    Ok(changed > 0)
}

/// Final grade of a student in a course.
///
/// A course-level grade row (no marking period) with `override_final` set is
/// returned as-is. Otherwise marking-period grades are averaged, weighted by
/// each marking period's weight. Letter grades count through their
/// normalized value, and a dominating letter replaces the result. With
/// `ignore_letter`, letters are skipped entirely.
pub fn calculate_real_grade(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
    ignore_letter: bool,
) -> Result<Option<EnrollmentGrade>> {
    let final_override: Option<(Option<f64>, Option<String>)> = conn
        .query_row(
            "SELECT grade, letter_grade FROM grades
             WHERE student_id = ? AND course_id = ? AND marking_period_id IS NULL
               AND override_final = 1",
            (student_id, course_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    if let Some((grade, letter)) = final_override {
        let letter = letter.as_deref().and_then(LetterGrade::parse);
        match (letter, grade) {
            (Some(l), _) if !ignore_letter => return Ok(Some(EnrollmentGrade::Letter(l))),
            (_, Some(g)) => return Ok(Some(EnrollmentGrade::Numeric(g))),
            _ => {}
        }
    }

    let mut stmt = conn.prepare(
        "SELECT g.grade, g.letter_grade, mp.weight
         FROM grades g
         JOIN marking_periods mp ON mp.id = g.marking_period_id
         WHERE g.student_id = ? AND g.course_id = ?
         ORDER BY mp.start_date",
    )?;
    let rows = stmt
        .query_map((student_id, course_id), |r| {
            Ok((
                r.get::<_, Option<f64>>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, f64>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut sum = 0.0_f64;
    let mut denom = 0.0_f64;
    for (grade, letter, weight) in rows {
        let value = match letter.as_deref().and_then(LetterGrade::parse) {
            Some(_) if ignore_letter => continue,
            Some(l) => {
                let Some(behavior) = l.behavior() else {
                    continue;
                };
                if behavior.dominates {
                    return Ok(Some(EnrollmentGrade::Letter(l)));
                }
                match behavior.normalized {
                    Some(n) => n * 100.0,
                    None => continue,
                }
            }
            None => match grade {
                Some(g) => g,
                None => continue,
            },
        };
        sum += value * weight;
        denom += weight;
    }

    if denom > 0.0 {
        Ok(Some(EnrollmentGrade::Numeric(round_off(
            sum / denom,
            GRADE_DECIMAL_PLACES,
        ))))
    } else {
        Ok(None)
    }
}

/// Read an enrollment's grade fields, recomputing and persisting stale ones.
pub fn enrollment_grade(conn: &Connection, enrollment_id: &str) -> Result<EnrollmentGradeView> {
    let row: Option<(String, String, Option<String>, bool, Option<f64>, bool)> = conn
        .query_row(
            "SELECT course_id, student_id, cached_grade, grade_stale,
                    cached_numeric_grade, numeric_grade_stale
             FROM course_enrollments WHERE id = ?",
            [enrollment_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get::<_, i64>(3)? != 0,
                    r.get(4)?,
                    r.get::<_, i64>(5)? != 0,
                ))
            },
        )
        .optional()?;
    let Some((course_id, student_id, mut grade, grade_stale, mut numeric, numeric_stale)) = row
    else {
        return Err(Error::NotFound("enrollment"));
    };

    if grade_stale {
        grade = calculate_real_grade(conn, &student_id, &course_id, false)?
            .map(EnrollmentGrade::cache_text);
        conn.execute(
            "UPDATE course_enrollments SET cached_grade = ?, grade_stale = 0 WHERE id = ?",
            (&grade, enrollment_id),
        )?;
    }
    if numeric_stale {
        numeric = match calculate_real_grade(conn, &student_id, &course_id, true)? {
            Some(EnrollmentGrade::Numeric(v)) => Some(v),
            _ => None,
        };
        conn.execute(
            "UPDATE course_enrollments
             SET cached_numeric_grade = ?, numeric_grade_stale = 0
             WHERE id = ?",
            (numeric, enrollment_id),
        )?;
    }

    Ok(EnrollmentGradeView {
        enrollment_id: enrollment_id.to_string(),
        course_id,
        student_id,
        grade,
        numeric_grade: numeric,
        recomputed: grade_stale || numeric_stale,
    })
}

/// Credit-weighted mean of the student's numeric course grades.
/// `None` stands for "N/A": no graded, credited course has a numeric grade.
pub fn calculate_gpa(conn: &Connection, student_id: &str) -> Result<Option<f64>> {
    let mut stmt = conn.prepare(
        "SELECT ce.id, c.credits
         FROM course_enrollments ce
         JOIN courses c ON c.id = ce.course_id
         WHERE ce.student_id = ? AND ce.role = ? AND c.graded = 1 AND c.credits > 0
         ORDER BY c.fullname",
    )?;
    let enrollments = stmt
        .query_map((student_id, STUDENT_ROLE), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut sum = 0.0_f64;
    let mut credits_total = 0.0_f64;
    for (enrollment_id, credits) in enrollments {
        let view = enrollment_grade(conn, &enrollment_id)?;
        if let Some(g) = view.numeric_grade {
            sum += g * credits;
            credits_total += credits;
        }
    }
    if credits_total > 0.0 {
        Ok(Some(round_off(sum / credits_total, GRADE_DECIMAL_PLACES)))
    } else {
        Ok(None)
    }
}

/// Recompute and store the student's GPA cache. "N/A" is never written
/// over a previously cached value.
pub fn refresh_student_gpa(conn: &Connection, student_id: &str) -> Result<Option<f64>> {
    let gpa = calculate_gpa(conn, student_id)?;
    if let Some(v) = gpa {
        conn.execute(
            "UPDATE students SET cache_gpa = ? WHERE id = ?",
            (v, student_id),
        )?;
    }
    Ok(gpa)
}

/// Invalidate every cache derived from `grade`.
pub fn invalidate_for_grade(conn: &Connection, grade: &Grade) -> Result<()> {
    if !flag_enrollment_stale(conn, &grade.course_id, &grade.student_id)? {
        tracing::debug!(
            course_id = %grade.course_id,
            student_id = %grade.student_id,
            "no enrollment for grade; skipping enrollment cache"
        );
    }
    if let Some(mp) = &grade.marking_period_id {
        mp_cache::flag_stale(conn, &grade.student_id, mp)?;
    }
    let gpa = refresh_student_gpa(conn, &grade.student_id)?;
    tracing::debug!(student_id = %grade.student_id, ?gpa, "student gpa recomputed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grades;
    use crate::test_support::*;

    fn save(conn: &Connection, student: &str, course: &str, mp: Option<&str>, value: &str) -> Grade {
        let mut g = grades::find(conn, student, course, mp)
            .expect("find")
            .unwrap_or_else(|| Grade::new(student, course, mp));
        assert!(g.set_grade(value), "set_grade({value})");
        grades::save(conn, &mut g).expect("save grade");
        g
    }

    fn stale_flags(conn: &Connection, enrollment_id: &str) -> (bool, bool) {
        conn.query_row(
            "SELECT grade_stale, numeric_grade_stale FROM course_enrollments WHERE id = ?",
            [enrollment_id],
            |r| Ok((r.get::<_, i64>(0)? != 0, r.get::<_, i64>(1)? != 0)),
        )
        .expect("flags")
    }

    #[test]
    fn weighted_enrollment_grade_over_marking_periods() {
        let conn = conn();
        let q1 = marking_period(&conn, "Q1", "2024-09-01", 1.0);
        let q2 = marking_period(&conn, "Q2", "2024-11-01", 3.0);
        // No credits: the GPA refresh on save leaves this enrollment unread.
        let c = course(&conn, "Biology", 0.0, &[&q1, &q2]);
        let s = student(&conn, "Avery");
        let e = enroll(&conn, &c, &s);

        save(&conn, &s, &c, Some(&q1), "80");
        save(&conn, &s, &c, Some(&q2), "90");

        let view = enrollment_grade(&conn, &e).expect("grade");
        assert!(view.recomputed);
        assert_eq!(view.numeric_grade, Some(87.5));
        assert_eq!(view.grade.as_deref(), Some("87.50"));
        assert_eq!(stale_flags(&conn, &e), (false, false));

        let again = enrollment_grade(&conn, &e).expect("cached");
        assert!(!again.recomputed);
    }

    #[test]
    fn incomplete_dominates_but_numeric_ignores_letters() {
        let conn = conn();
        let q1 = marking_period(&conn, "Q1", "2024-09-01", 1.0);
        let q2 = marking_period(&conn, "Q2", "2024-11-01", 1.0);
        let c = course(&conn, "Art", 1.0, &[&q1, &q2]);
        let s = student(&conn, "Blake");
        let e = enroll(&conn, &c, &s);

        save(&conn, &s, &c, Some(&q1), "70");
        save(&conn, &s, &c, Some(&q2), "i");

        let view = enrollment_grade(&conn, &e).expect("grade");
        assert_eq!(view.grade.as_deref(), Some("I"));
        assert_eq!(view.numeric_grade, Some(70.0));
    }

    #[test]
    fn pass_counts_as_full_marks_and_b_is_skipped() {
        let conn = conn();
        let q1 = marking_period(&conn, "Q1", "2024-09-01", 1.0);
        let q2 = marking_period(&conn, "Q2", "2024-11-01", 1.0);
        let q3 = marking_period(&conn, "Q3", "2025-01-10", 1.0);
        let c = course(&conn, "Music", 1.0, &[&q1, &q2, &q3]);
        let s = student(&conn, "Casey");
        let e = enroll(&conn, &c, &s);

        save(&conn, &s, &c, Some(&q1), "60");
        save(&conn, &s, &c, Some(&q2), "P");
        save(&conn, &s, &c, Some(&q3), "B");

        assert_eq!(enrollment_grade(&conn, &e).expect("grade").grade.as_deref(), Some("80.00"));
    }

    #[test]
    fn final_override_wins() {
        let conn = conn();
        let q1 = marking_period(&conn, "Q1", "2024-09-01", 1.0);
        let c = course(&conn, "History", 1.0, &[&q1]);
        let s = student(&conn, "Drew");
        let e = enroll(&conn, &c, &s);

        save(&conn, &s, &c, Some(&q1), "50");
        let mut fin = Grade::new(&s, &c, None);
        fin.set_grade("95");
        fin.override_final = true;
        grades::save(&conn, &mut fin).expect("save final");

        assert_eq!(enrollment_grade(&conn, &e).expect("grade").numeric_grade, Some(95.0));
    }

    #[test]
    fn saving_flags_enrollment_stale_and_refreshes_gpa() {
        let conn = conn();
        let q1 = marking_period(&conn, "Q1", "2024-09-01", 1.0);
        let math = course(&conn, "Math", 2.0, &[&q1]);
        let gym = course(&conn, "Gym", 1.0, &[&q1]);
        let homeroom = course(&conn, "Homeroom", 0.0, &[&q1]);
        let s = student(&conn, "Emery");
        enroll(&conn, &math, &s);
        enroll(&conn, &gym, &s);
        let hr = enroll(&conn, &homeroom, &s);

        save(&conn, &s, &homeroom, Some(&q1), "50");
        enrollment_grade(&conn, &hr).expect("warm cache");
        assert_eq!(stale_flags(&conn, &hr), (false, false));
        save(&conn, &s, &homeroom, Some(&q1), "55");
        assert_eq!(stale_flags(&conn, &hr), (true, true));
        assert_eq!(enrollment_grade(&conn, &hr).expect("grade").numeric_grade, Some(55.0));

        save(&conn, &s, &gym, Some(&q1), "60");
        save(&conn, &s, &math, Some(&q1), "93");
        let gpa = crate::roster::get_student(&conn, &s).expect("student").cache_gpa;
        assert_eq!(gpa, Some(82.0));
    }

    #[test]
    fn missing_enrollment_is_skipped() {
        let conn = conn();
        let q1 = marking_period(&conn, "Q1", "2024-09-01", 1.0);
        let c = course(&conn, "Latin", 1.0, &[&q1]);
        let s = student(&conn, "Finley");
        let g = save(&conn, &s, &c, Some(&q1), "77");
        assert!(g.id.is_some());
        assert_eq!(calculate_gpa(&conn, &s).expect("gpa"), None);
    }

    #[test]
    fn na_gpa_keeps_previous_cache() {
        let conn = conn();
        let q1 = marking_period(&conn, "Q1", "2024-09-01", 1.0);
        let c = course(&conn, "Chem", 1.0, &[&q1]);
        let s = student(&conn, "Gray");
        enroll(&conn, &c, &s);
        let g = save(&conn, &s, &c, Some(&q1), "88");
        assert_eq!(crate::roster::get_student(&conn, &s).expect("s").cache_gpa, Some(88.0));

        grades::delete(&conn, g.id.as_deref().expect("id")).expect("delete");
        assert_eq!(calculate_gpa(&conn, &s).expect("gpa"), None);
        assert_eq!(crate::roster::get_student(&conn, &s).expect("s").cache_gpa, Some(88.0));
    }

    #[test]
    fn delete_recomputes_gpa_without_the_grade() {
        let conn = conn();
        let q1 = marking_period(&conn, "Q1", "2024-09-01", 1.0);
        let q2 = marking_period(&conn, "Q2", "2024-11-01", 1.0);
        let c = course(&conn, "Physics", 1.0, &[&q1, &q2]);
        let s = student(&conn, "Harper");
        enroll(&conn, &c, &s);
        save(&conn, &s, &c, Some(&q1), "70");
        let g2 = save(&conn, &s, &c, Some(&q2), "90");
        assert_eq!(crate::roster::get_student(&conn, &s).expect("s").cache_gpa, Some(80.0));

        grades::delete(&conn, g2.id.as_deref().expect("id")).expect("delete");
        assert_eq!(crate::roster::get_student(&conn, &s).expect("s").cache_gpa, Some(70.0));
    }
}
