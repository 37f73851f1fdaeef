use crate::ipc::error::err;
use crate::ipc::helpers::{parse_params, respond};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, MarkingPeriod};

fn handle_marking_periods_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut mp: MarkingPeriod = match parse_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let r = roster::create_marking_period(conn, &mut mp).map(|_| mp);
    respond(req, "markingPeriod", r)
}

fn handle_marking_periods_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(req, "markingPeriods", roster::list_marking_periods(conn))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "markingPeriods.create" => Some(handle_marking_periods_create(state, req)),
        "markingPeriods.list" => Some(handle_marking_periods_list(state, req)),
        _ => None,
    }
}
