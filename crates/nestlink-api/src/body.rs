//! Request body decoding.

use axum::http::{header, HeaderMap};
use nestlink_core::config::schema::MAX_BODY_BYTES;
use nestlink_core::SchemaRequest;
use serde_json::Value;

use crate::error::RequestError;

/// Decode and validate one ST-Schema request.
///
/// The body must be a single JSON object of at most 100KB. A Content-Type
/// header, when present, must be `application/json`.
pub fn decode_request(headers: &HeaderMap, body: &[u8]) -> Result<SchemaRequest, RequestError> {
    if let Some(value) = headers.get(header::CONTENT_TYPE) {
        let raw = value.to_str().unwrap_or_default();
        let mime = raw.split(';').next().unwrap_or_default().trim();
        if !mime.eq_ignore_ascii_case("application/json") {
            return Err(RequestError::ContentType(raw.to_string()));
        }
    }

    if body.len() > MAX_BODY_BYTES {
        return Err(RequestError::TooLarge(MAX_BODY_BYTES));
    }

    let mut stream = serde_json::Deserializer::from_slice(body).into_iter::<Value>();
    let value = match stream.next() {
        Some(Ok(value)) => value,
        Some(Err(e)) => return Err(RequestError::Parse(e.to_string())),
        None => return Err(RequestError::Parse("request body is empty".to_string())),
    };
    if stream.next().is_some() {
        return Err(RequestError::Parse(
            "request body must only contain a single JSON object".to_string(),
        ));
    }
    if !value.is_object() {
        return Err(RequestError::Parse("request body is not a JSON object".to_string()));
    }

    let request: SchemaRequest =
        serde_json::from_value(value).map_err(|e| RequestError::Parse(e.to_string()))?;
    request.validate()?;
    Ok(request)
}
