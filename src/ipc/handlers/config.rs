use crate::config;
use crate::ipc::error::{err, model_err, ok};
use crate::ipc::helpers::{require_str, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    // Without a name, report every known key with its effective value.
    let Some(name) = str_param(req, "name") else {
        let mut values = Map::new();
        for name in config::known_names() {
            match config::get_or_default(conn, name) {
                Ok(v) => {
                    values.insert(name.to_string(), Value::String(v));
                }
                Err(e) => return model_err(&req.id, e),
            }
        }
        return ok(&req.id, json!({ "values": values }));
    };

    match config::get_or_default(conn, name) {
        Ok(v) => ok(&req.id, json!({ "name": name, "value": v })),
        Err(e) => model_err(&req.id, e),
    }
}

fn handle_config_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let value = match req.params.get("value") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return err(&req.id, "bad_params", "value must be a string or number", None),
    };
    if let Err(e) = config::set(conn, &name, &value) {
        return model_err(&req.id, e);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.set" => Some(handle_config_set(state, req)),
        _ => None,
    }
}
