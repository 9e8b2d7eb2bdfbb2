pub mod analyze;
pub mod compare;
pub mod health;
pub mod status;

use serde::Serialize;
use serde_json::{json, Value};

use crate::util::multipart::{extract_boundary, parse_parts, Part};

/// Status code plus JSON body; turned into an HTTP response by the router.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok<T: Serialize>(body: &T) -> ApiResponse {
        match serde_json::to_value(body) {
            Ok(body) => ApiResponse { status: 200, body },
            Err(e) => ApiResponse::error(500, "serialization_error", e.to_string()),
        }
    }

    /// `{"error": code, "message": text}`.
    pub fn error(status: u16, code: &str, message: impl Into<String>) -> ApiResponse {
        ApiResponse {
            status,
            body: json!({ "error": code, "message": message.into() }),
        }
    }

    /// 400 for problems with the caller's image, 500 otherwise.
    pub fn from_error(e: &medimg::Error) -> ApiResponse {
        let status = if e.is_client_error() { 400 } else { 500 };
        ApiResponse::error(status, e.code(), e.to_string())
    }
}

/// Parses a multipart body or explains why it cannot.
pub fn multipart<'a>(content_type: &str, body: &'a [u8]) -> Result<Vec<Part<'a>>, ApiResponse> {
    if !content_type.starts_with("multipart/form-data") {
        return Err(ApiResponse::error(
            400,
            "bad_request",
            "expected a multipart/form-data upload",
        ));
    }
    let boundary = extract_boundary(content_type)
        .ok_or_else(|| ApiResponse::error(400, "bad_request", "multipart boundary missing"))?;
    Ok(parse_parts(body, &boundary))
}
