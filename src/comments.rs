use crate::error::{Error, Result};
use rusqlite::Connection;
use serde::Serialize;

/// Column maximum shared by grade comment codes and grade record comments.
pub const GRADE_COMMENT_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeComment {
    pub id: i64,
    pub comment: String,
}

impl std::fmt::Display for GradeComment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.id, self.comment)
    }
}

pub fn list(conn: &Connection) -> Result<Vec<GradeComment>> {
    let mut stmt = conn.prepare("SELECT id, comment FROM grade_comments ORDER BY id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(GradeComment {
                id: r.get(0)?,
                comment: r.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn upsert(conn: &Connection, id: i64, comment: &str) -> Result<GradeComment> {
    let len = comment.chars().count();
    if len > GRADE_COMMENT_MAX_CHARS {
        return Err(Error::Validation(format!(
            "Ensure this value has at most {} characters (it has {}).",
            GRADE_COMMENT_MAX_CHARS, len
        )));
    }
    conn.execute(
        "INSERT INTO grade_comments(id, comment) VALUES(?, ?)
         ON CONFLICT(id) DO UPDATE SET comment = excluded.comment",
        (id, comment),
    )?;
    Ok(GradeComment {
        id,
        comment: comment.to_string(),
    })
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM grade_comments WHERE id = ?", [id])?;
    if changed == 0 {
        return Err(Error::NotFound("grade comment"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        crate::db::init_schema(&conn).expect("init");
        conn
    }

    #[test]
    fn list_is_ordered_by_code() {
        let conn = conn();
        upsert(&conn, 12, "Needs to complete homework").expect("12");
        upsert(&conn, 3, "Excellent participation").expect("3");
        upsert(&conn, 12, "Missing homework").expect("12 again");
        let all = list(&conn).expect("list");
        assert_eq!(all.iter().map(|c| c.id).collect::<Vec<_>>(), vec![3, 12]);
        assert_eq!(all[1].to_string(), "12: Missing homework");
    }

    #[test]
    fn negative_codes_are_plain_integers() {
        let conn = conn();
        upsert(&conn, -4, "Withdrawn").expect("negative code");
        assert_eq!(list(&conn).expect("list")[0].id, -4);
    }

    #[test]
    fn delete_missing_is_not_found() {
        let conn = conn();
        assert_eq!(delete(&conn, 9).unwrap_err().code(), "not_found");
    }

    #[test]
    fn overlong_comment_rejected() {
        let conn = conn();
        let long = "x".repeat(GRADE_COMMENT_MAX_CHARS + 1);
        assert_eq!(upsert(&conn, 1, &long).unwrap_err().code(), "validation_failed");
    }
}
