use crate::comments;
use crate::ipc::error::{err, model_err, ok};
use crate::ipc::helpers::{require_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn comment_id(req: &Request) -> Result<i64, serde_json::Value> {
    match req.params.get("id").and_then(|v| v.as_i64()) {
        Some(id) => Ok(id),
        None => Err(err(&req.id, "bad_params", "missing id", None)),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match comments::list(conn) {
        Ok(rows) => {
            let labels: Vec<String> = rows.iter().map(|c| c.to_string()).collect();
            ok(&req.id, json!({ "comments": rows, "labels": labels }))
        }
        Err(e) => model_err(&req.id, e),
    }
}

fn handle_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match comment_id(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let text = match require_str(req, "comment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(req, "comment", comments::upsert(conn, id, &text))
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match comment_id(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match comments::delete(conn, id) {
        Ok(()) => ok(&req.id, json!({ "deleted": id })),
        Err(e) => model_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gradeComments.list" => Some(handle_list(state, req)),
        "gradeComments.upsert" => Some(handle_upsert(state, req)),
        "gradeComments.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
