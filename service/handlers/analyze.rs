use serde::Serialize;

use medimg::Prediction;

use crate::handlers::{multipart, ApiResponse};
use crate::state::ServiceState;
use crate::util::multipart::file_part;

#[derive(Serialize)]
struct AnalyzeResponse<'a> {
    classes: Vec<&'a str>,
    probabilities: &'a Prediction,
}

// ---------------------------------------------------------------------------
// POST /analyze
// ---------------------------------------------------------------------------

/// Classifies the uploaded image (field `file`, or the first file part).
pub fn handle(content_type: &str, body: &[u8], state: &ServiceState) -> ApiResponse {
    let Some(runner) = &state.runner else {
        let reason = state.load_error.as_deref().unwrap_or("model not loaded");
        return ApiResponse::error(503, "model_not_loaded", reason);
    };
    let parts = match multipart(content_type, body) {
        Ok(parts) => parts,
        Err(resp) => return resp,
    };
    let upload = match file_part(&parts, "file") {
        Some(part) if !part.data.is_empty() => part,
        _ => return ApiResponse::error(400, "bad_request", "no image file was uploaded"),
    };

    match runner.infer_bytes(upload.data) {
        Ok(prediction) => ApiResponse::ok(&AnalyzeResponse {
            classes: prediction.classes().collect(),
            probabilities: &prediction,
        }),
        Err(e) => ApiResponse::from_error(&e),
    }
}
