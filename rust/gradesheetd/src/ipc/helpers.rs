use serde::de::DeserializeOwned;

use super::error::err;
use super::types::Request;

/// Deserialize `params[key]`. Absent and null are `Ok(None)`; a malformed value
/// comes back as a ready `bad_params` response.
pub fn parse_param<T: DeserializeOwned>(
    req: &Request,
    key: &str,
) -> Result<Option<T>, serde_json::Value> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| err(&req.id, "bad_params", format!("invalid {key}: {e}"), None)),
    }
}

pub fn get_index(req: &Request, key: &str) -> Option<usize> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .filter(|v| *v >= 0)
        .map(|v| v as usize)
}

pub fn get_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}
