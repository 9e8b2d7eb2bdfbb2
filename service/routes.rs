use std::io::{Cursor, Read};

use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{info, warn};

use crate::handlers::{self, ApiResponse};
use crate::state::SharedState;

/// Uploads above this size are refused with 413.
pub const MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

pub fn json_response(api: &ApiResponse) -> Response<Cursor<Vec<u8>>> {
    let bytes = api.body.to_string().into_bytes();
    let len = bytes.len();
    Response::new(
        StatusCode(api.status),
        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
            .into_iter()
            .collect(),
        Cursor::new(bytes),
        Some(len),
        None,
    )
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Routes one request and responds to it. Runs on the request's own thread.
pub fn dispatch(mut request: Request, state: SharedState) {
    let method = request.method().clone();
    let url = request.url().to_owned();
    let path = url.split('?').next().unwrap_or("").to_owned();

    let api = match (&method, path.as_str()) {
        (Method::Get, "/health") => handlers::health::handle(&state),
        (Method::Get, "/status") => handlers::status::handle(&state),
        (Method::Post, "/analyze") | (Method::Post, "/compare") => match read_body(&mut request) {
            Ok((content_type, body)) => {
                if path == "/analyze" {
                    handlers::analyze::handle(&content_type, &body, &state)
                } else {
                    handlers::compare::handle(&content_type, &body)
                }
            }
            Err(api) => api,
        },
        (_, "/health") | (_, "/status") | (_, "/analyze") | (_, "/compare") => {
            ApiResponse::error(405, "method_not_allowed", format!("{} not allowed on {}", method, path))
        }
        _ => ApiResponse::error(404, "not_found", format!("no route for {}", path)),
    };

    info!("{} {} -> {}", method, path, api.status);
    if let Err(e) = request.respond(json_response(&api)) {
        warn!("Failed to send response for {} {}: {}", method, path, e);
    }
}

fn read_body(request: &mut Request) -> Result<(String, Vec<u8>), ApiResponse> {
    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_owned())
        .unwrap_or_default();

    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|e| ApiResponse::error(400, "bad_request", format!("cannot read request body: {}", e)))?;
    if body.len() as u64 > MAX_BODY_BYTES {
        return Err(ApiResponse::error(
            413,
            "payload_too_large",
            format!("request body exceeds {} bytes", MAX_BODY_BYTES),
        ));
    }
    Ok((content_type, body))
}
