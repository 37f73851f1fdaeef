//! Workspace configuration: named values stored in the `settings` table,
//! falling back to (and persisting) a built-in default on first read.

use crate::db;
use crate::error::{Error, Result};
use rusqlite::Connection;
use serde_json::Value;

pub const GRADE_COMMENT_LENGTH_LIMIT: &str = "Grade comment length limit";
pub const GRADEBOOK_HIDE_FIELDS: &str = "Gradebook hide fields";

const KEY_PREFIX: &str = "config.";

fn builtin_default(name: &str) -> Option<&'static str> {
    match name {
        GRADE_COMMENT_LENGTH_LIMIT => Some("500"),
        GRADEBOOK_HIDE_FIELDS => Some(""),
        _ => None,
    }
}

pub fn known_names() -> &'static [&'static str] {
    &[GRADE_COMMENT_LENGTH_LIMIT, GRADEBOOK_HIDE_FIELDS]
}

pub fn get_or_default(conn: &Connection, name: &str) -> Result<String> {
    let key = format!("{KEY_PREFIX}{name}");
    if let Some(saved) = db::settings_get_json(conn, &key)? {
        if let Some(s) = saved.as_str() {
            return Ok(s.to_string());
        }
        // Non-string values written by older builds are stringified.
        return Ok(saved.to_string());
    }
    let Some(default) = builtin_default(name) else {
        return Err(Error::NotFound("configuration"));
    };
    db::settings_set_json(conn, &key, &Value::String(default.to_string()))?;
    tracing::debug!(name, default, "configuration default materialized");
    Ok(default.to_string())
}

pub fn set(conn: &Connection, name: &str, value: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::BadParams("configuration name must not be empty".into()));
    }
    if name == GRADE_COMMENT_LENGTH_LIMIT && value.trim().parse::<usize>().is_err() {
        return Err(Error::BadParams(format!(
            "{} must be a non-negative integer",
            GRADE_COMMENT_LENGTH_LIMIT
        )));
    }
    db::settings_set_json(
        conn,
        &format!("{KEY_PREFIX}{name}"),
        &Value::String(value.to_string()),
    )?;
    Ok(())
}

pub fn grade_comment_length_limit(conn: &Connection) -> Result<usize> {
    let raw = get_or_default(conn, GRADE_COMMENT_LENGTH_LIMIT)?;
    raw.trim().parse::<usize>().map_err(|_| {
        Error::Validation(format!(
            "configuration '{}' is not an integer: {}",
            GRADE_COMMENT_LENGTH_LIMIT, raw
        ))
    })
}

/// Lowercased, trimmed entries of a comma separated configuration value.
pub fn csv_list(raw: &str) -> Vec<String> {
    raw.to_lowercase()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("init");
        conn
    }

    #[test]
    fn default_is_returned_and_persisted() {
        let conn = conn();
        assert_eq!(grade_comment_length_limit(&conn).expect("limit"), 500);
        let stored = db::settings_get_json(&conn, "config.Grade comment length limit")
            .expect("get")
            .expect("persisted");
        assert_eq!(stored, Value::String("500".into()));
    }

    #[test]
    fn unknown_name_without_value_is_not_found() {
        let conn = conn();
        let e = get_or_default(&conn, "No such key").unwrap_err();
        assert_eq!(e.code(), "not_found");
    }

    #[test]
    fn set_validates_comment_limit() {
        let conn = conn();
        assert!(set(&conn, GRADE_COMMENT_LENGTH_LIMIT, "ten").is_err());
        set(&conn, GRADE_COMMENT_LENGTH_LIMIT, "12").expect("set");
        assert_eq!(grade_comment_length_limit(&conn).expect("limit"), 12);
    }

    #[test]
    fn csv_list_normalizes_entries() {
        assert_eq!(
            csv_list(" Date, BENCHMARK ,,description"),
            vec!["date", "benchmark", "description"]
        );
        assert!(csv_list("").is_empty());
    }
}
