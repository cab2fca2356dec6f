//! Success envelope shared by the JSON endpoints. Errors are shaped by
//! [`AppError`](crate::errors::AppError).

use axum::Json;
use serde_json::{Map, Value, json};

/// `{"status": "ok", ...fields}`. Non-object payloads are ignored.
pub fn success(fields: Value) -> Json<Value> {
    let mut body = Map::new();
    body.insert("status".into(), json!("ok"));
    if let Value::Object(fields) = fields {
        body.extend(fields);
    }
    Json(Value::Object(body))
}
