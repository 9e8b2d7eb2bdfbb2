use serde_json::json;

use crate::handlers::ApiResponse;
use crate::state::ServiceState;

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub fn handle(state: &ServiceState) -> ApiResponse {
    let classes: Vec<&str> = state
        .runner
        .as_ref()
        .map(|r| r.schema().names().iter().map(String::as_str).collect())
        .unwrap_or_default();
    ApiResponse {
        status: 200,
        body: json!({
            "status": "ok",
            "model_loaded": state.runner.is_some(),
            "classes": classes,
            "checkpoint": state.runner.as_ref().and_then(|r| r.checkpoint_path()),
            "detail": state.load_error,
        }),
    }
}
