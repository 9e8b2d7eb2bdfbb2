//! Minimal `multipart/form-data` parsing for image uploads.

/// One part of a multipart body; `data` borrows from the request body.
#[derive(Debug, PartialEq)]
pub struct Part<'a> {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub data: &'a [u8],
}

impl Part<'_> {
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }
}

/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`, returning the pieces
/// between occurrences (excluding the needle itself).
pub fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(|s| s.trim())
        .find(|s| s.starts_with("boundary="))
        .map(|s| s["boundary=".len()..].trim_matches('"').to_owned())
        .filter(|b| !b.is_empty())
}

/// Parses every part that has a header block. The preamble and the closing
/// `--` marker are skipped.
pub fn parse_parts<'a>(body: &'a [u8], boundary: &str) -> Vec<Part<'a>> {
    let delimiter = format!("--{}", boundary);
    let sep = b"\r\n\r\n";
    let mut parts = Vec::new();

    for raw in split_on(body, delimiter.as_bytes()).into_iter().skip(1) {
        if raw.starts_with(b"--") {
            break;
        }
        let raw = raw.strip_prefix(b"\r\n").unwrap_or(raw);
        let Some(sep_pos) = find_subsequence(raw, sep) else {
            continue;
        };
        let headers = String::from_utf8_lossy(&raw[..sep_pos]);
        let data = &raw[sep_pos + sep.len()..];
        let data = data.strip_suffix(b"\r\n").unwrap_or(data);
        parts.push(Part {
            name: disposition_param(&headers, "name"),
            filename: disposition_param(&headers, "filename"),
            data,
        });
    }
    parts
}

/// The file part named `field`, or failing that the first file part.
pub fn file_part<'p, 'a>(parts: &'p [Part<'a>], field: &str) -> Option<&'p Part<'a>> {
    parts
        .iter()
        .find(|p| p.is_file() && p.name.as_deref() == Some(field))
        .or_else(|| parts.iter().find(|p| p.is_file()))
}

/// The file part named exactly `field`.
pub fn named_file_part<'p, 'a>(parts: &'p [Part<'a>], field: &str) -> Option<&'p Part<'a>> {
    parts
        .iter()
        .find(|p| p.is_file() && p.name.as_deref() == Some(field))
}

/// Reads `key="value"` out of a Content-Disposition header block. `name` does
/// not match the tail of `filename`.
fn disposition_param(headers: &str, key: &str) -> Option<String> {
    let line = headers
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("content-disposition"))?;
    for param in line.split(';').skip(1) {
        let param = param.trim();
        if let Some(value) = param.strip_prefix(key).and_then(|r| r.strip_prefix('=')) {
            return Some(value.trim_matches('"').to_owned());
        }
    }
    None
}
