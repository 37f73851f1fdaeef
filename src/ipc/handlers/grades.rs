use crate::error::Error;
use crate::grades::{self, GetGradeOptions, Grade, GradeFilter, LetterGrade};
use crate::ipc::error::{err, model_err, ok};
use crate::ipc::helpers::{require_str, respond, str_param};
use crate::ipc::types::{AppState, Request};
use crate::roster;
use rusqlite::Connection;
use serde_json::{json, Value};

fn grade_json(g: &Grade) -> Value {
    let mut v = serde_json::to_value(g).unwrap_or_else(|_| json!({}));
    v["display"] = serde_json::to_value(g.display_grade()).unwrap_or(Value::Null);
    v
}

/// Raw text handed to `Grade::set_grade`: numbers keep their JSON spelling,
/// null reads as blank.
fn set_grade_input(v: &Value) -> Option<String> {
    match v {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn load_target(conn: &Connection, req: &Request) -> Result<Grade, Value> {
    if let Some(grade_id) = str_param(req, "gradeId") {
        return match grades::get_by_id(conn, grade_id) {
            Ok(Some(g)) => Ok(g),
            Ok(None) => Err(err(&req.id, "not_found", "grade not found", None)),
            Err(e) => Err(model_err(&req.id, e)),
        };
    }
    let student_id = require_str(req, "studentId")?;
    let course_id = require_str(req, "courseId")?;
    let mp = str_param(req, "markingPeriodId");
    match grades::find(conn, &student_id, &course_id, mp) {
        Ok(Some(g)) => Ok(g),
        Ok(None) => Ok(Grade::new(&student_id, &course_id, mp)),
        Err(e) => Err(model_err(&req.id, e)),
    }
}

fn handle_grades_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut grade = match load_target(conn, req) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    let stored = grade.id.as_ref().map(|_| grade.clone());

    if let Some(v) = req.params.get("overrideFinal") {
        let Some(b) = v.as_bool() else {
            return err(&req.id, "bad_params", "overrideFinal must be boolean", None);
        };
        grade.override_final = b;
    }
    if let Some(v) = req.params.get("comment") {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "comment must be a string", None);
        };
        grade.comment = s.to_string();
    }

    if let Some(v) = req.params.get("value") {
        let Some(raw) = set_grade_input(v) else {
            return err(&req.id, "bad_params", "value must be a string, number or null", None);
        };
        if !grade.set_grade(&raw) {
            // Lenient entry: report the failure and leave the stored record alone.
            tracing::debug!(value = %raw, "grade value not recognized");
            let current = stored.as_ref().map(grade_json);
            return ok(&req.id, json!({ "set": false, "value": raw, "grade": current }));
        }
    } else {
        // Direct field assignment; exclusivity is left to validation.
        if let Some(v) = req.params.get("grade") {
            grade.grade = match v {
                Value::Null => None,
                other => match other.as_f64() {
                    Some(n) => Some(n),
                    None => return err(&req.id, "bad_params", "grade must be a number or null", None),
                },
            };
        }
        if let Some(v) = req.params.get("letterGrade") {
            grade.letter_grade = match v {
                Value::Null => None,
                Value::String(s) => match LetterGrade::parse(s) {
                    Some(l) => Some(l),
                    None => {
                        return model_err(
                            &req.id,
                            Error::Validation(format!("'{}' is not a valid letter grade", s)),
                        )
                    }
                },
                _ => return err(&req.id, "bad_params", "letterGrade must be a string or null", None),
            };
        }
    }

    if let Err(e) = grades::save(conn, &mut grade) {
        return model_err(&req.id, e);
    }
    ok(&req.id, json!({ "set": true, "grade": grade_json(&grade) }))
}

fn handle_grades_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let grade = match load_target(conn, req) {
        Ok(g) if g.id.is_some() => g,
        Ok(_) => return err(&req.id, "not_found", "grade not found", None),
        Err(resp) => return resp,
    };

    let rounding = match req.params.get("rounding") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_u64() {
            Some(n) if n <= 10 => Some(n as usize),
            _ => return err(&req.id, "bad_params", "rounding must be an integer in 0..=10", None),
        },
    };
    let minimum = match req.params.get("minimum") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_f64() {
            Some(n) => Some(n),
            None => return err(&req.id, "bad_params", "minimum must be a number", None),
        },
    };
    let opts = GetGradeOptions {
        display: req
            .params
            .get("display")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        rounding,
        minimum,
    };
    ok(
        &req.id,
        json!({
            "grade": grade_json(&grade),
            "value": grade.get_grade(&opts),
        }),
    )
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let filter = GradeFilter {
        student_id: str_param(req, "studentId").map(str::to_string),
        course_id: str_param(req, "courseId").map(str::to_string),
        marking_period_id: str_param(req, "markingPeriodId").map(str::to_string),
    };
    match grades::list(conn, &filter) {
        Ok(rows) => {
            let out: Vec<Value> = rows.iter().map(grade_json).collect();
            ok(&req.id, json!({ "grades": out }))
        }
        Err(e) => model_err(&req.id, e),
    }
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let grade_id = match require_str(req, "gradeId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let removed = match grades::delete(conn, &grade_id) {
        Ok(g) => g,
        Err(e) => return model_err(&req.id, e),
    };
    let student = roster::get_student(conn, &removed.student_id).map(|s| {
        json!({
            "studentId": s.id,
            "cacheGpa": s.cache_gpa,
        })
    });
    respond(req, "student", student)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.save" => Some(handle_grades_save(state, req)),
        "grades.get" => Some(handle_grades_get(state, req)),
        "grades.list" => Some(handle_grades_list(state, req)),
        "grades.delete" => Some(handle_grades_delete(state, req)),
        _ => None,
    }
}
