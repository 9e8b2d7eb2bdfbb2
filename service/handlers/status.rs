use std::io;

use medimg::train::read_status;

use crate::handlers::ApiResponse;
use crate::state::ServiceState;

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

pub fn handle(state: &ServiceState) -> ApiResponse {
    let Some(path) = &state.status_path else {
        return ApiResponse::error(404, "not_found", "no training run configured");
    };
    match read_status(path) {
        Ok(status) => ApiResponse::ok(&status),
        Err(medimg::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            ApiResponse::error(404, "not_found", format!("no status file at {}", path.display()))
        }
        Err(e) => ApiResponse::from_error(&e),
    }
}
