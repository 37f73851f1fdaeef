use crate::ipc::error::{err, model_err, ok};
use crate::ipc::helpers::{require_str, respond};
use crate::ipc::types::{AppState, Request};
use crate::mp_cache;
use serde_json::json;

fn handle_build_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(req, "summary", mp_cache::build_all_cache(conn))
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match require_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let mp_id = match require_str(req, "markingPeriodId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(req, "markingPeriodGrade", mp_cache::get(conn, &student_id, &mp_id))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let student_id = match require_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match mp_cache::list_for_student(conn, &student_id) {
        Ok(rows) => ok(&req.id, json!({ "studentId": student_id, "markingPeriodGrades": rows })),
        Err(e) => model_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "mpGrades.buildAll" => Some(handle_build_all(state, req)),
        "mpGrades.get" => Some(handle_get(state, req)),
        "mpGrades.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
