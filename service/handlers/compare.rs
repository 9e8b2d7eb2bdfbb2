use medimg::transform::decode_bytes;

use crate::handlers::{multipart, ApiResponse};
use crate::util::multipart::named_file_part;

// ---------------------------------------------------------------------------
// POST /compare
// ---------------------------------------------------------------------------

/// Compares the `target` upload against the `reference` upload.
pub fn handle(content_type: &str, body: &[u8]) -> ApiResponse {
    let parts = match multipart(content_type, body) {
        Ok(parts) => parts,
        Err(resp) => return resp,
    };
    let (Some(reference), Some(target)) = (
        named_file_part(&parts, "reference"),
        named_file_part(&parts, "target"),
    ) else {
        return ApiResponse::error(400, "bad_request", "expected `reference` and `target` file fields");
    };

    let result = decode_bytes(reference.data)
        .and_then(|r| decode_bytes(target.data).map(|t| (r, t)))
        .and_then(|(r, t)| medimg::compare(&r, &t));
    match result {
        Ok(result) => ApiResponse::ok(&result),
        Err(e) => ApiResponse::from_error(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{body, content_type, png};

    #[test]
    fn identical_uploads_are_similar() {
        let img = png(16, 16, 40);
        let resp = handle(&content_type(), &body(&[("reference", &img), ("target", &img)]));
        assert_eq!(resp.status, 200, "{}", resp.body);
        assert!((resp.body["similarity"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(resp.body["mean_absolute_difference"].as_f64().unwrap(), 0.0);
    }

    #[test]
    fn different_sizes_are_accepted() {
        let a = png(16, 16, 40);
        let b = png(24, 20, 200);
        let resp = handle(&content_type(), &body(&[("reference", &a), ("target", &b)]));
        assert_eq!(resp.status, 200, "{}", resp.body);
        assert!(resp.body["mean_absolute_difference"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn missing_target_is_400() {
        let a = png(4, 4, 0);
        let resp = handle(&content_type(), &body(&[("reference", &a)]));
        assert_eq!(resp.status, 400);
    }
}
