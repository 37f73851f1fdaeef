use crate::ipc::error::{err, model_err, ok};
use crate::ipc::types::Request;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

pub fn str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

/// A required string parameter, or the `bad_params` response to return.
pub fn require_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match str_param(req, key) {
        Some(v) => Ok(v.to_string()),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

pub fn parse_params<T: DeserializeOwned>(req: &Request) -> Result<T, serde_json::Value> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| err(&req.id, "bad_params", e.to_string(), None))
}

/// Wrap a model result as `{ key: value }`.
pub fn respond<T: Serialize>(req: &Request, key: &str, r: crate::error::Result<T>) -> serde_json::Value {
    match r {
        Ok(v) => match serde_json::to_value(v) {
            Ok(value) => ok(&req.id, json!({ key: value })),
            Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
        },
        Err(e) => model_err(&req.id, e),
    }
}
