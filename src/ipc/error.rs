use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Response for a model error, keeping its stable code.
pub fn model_err(id: &str, e: crate::error::Error) -> serde_json::Value {
    if matches!(e, crate::error::Error::Database(_) | crate::error::Error::Other(_)) {
        tracing::warn!(code = e.code(), error = %e, "request failed");
    }
    err(id, e.code(), e.to_string(), None)
}
