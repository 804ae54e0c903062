//! Extension to MIME type lookup.

use std::path::Path;

/// Returned when an extension is unknown.
pub const DEFAULT_MIME: &str = "application/octet-stream";

const MIMES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("txt", "text/plain"),
    ("css", "text/css"),
    ("csv", "text/csv"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("form", "application/x-www-form-urlencoded"),
];

/// Look up the MIME type for a short name such as `"html"` or `"png"`.
pub fn from_extension(ext: &str) -> &'static str {
    let ext = ext.trim_start_matches('.');
    MIMES
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, m)| *m)
        .unwrap_or(DEFAULT_MIME)
}

/// MIME type derived from a file's extension.
pub fn from_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|e| e.to_str())
        .map(from_extension)
        .unwrap_or(DEFAULT_MIME)
}
