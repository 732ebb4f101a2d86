//! Content-type guessing for uploaded objects.

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Leading bytes of formats commonly uploaded without a usable extension.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"PK\x03\x04", "application/zip"),
];

/// Content type for an object stored at `path` with contents `bytes`.
///
/// The extension decides when it is known; otherwise the leading bytes are
/// sniffed, and valid UTF-8 without NUL bytes counts as plain text.
pub fn guess(path: &str, bytes: &[u8]) -> &'static str {
    if let Some(mime) = mime_guess::from_path(path).first_raw() {
        return mime;
    }
    sniff(bytes)
}

fn sniff(bytes: &[u8]) -> &'static str {
    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| bytes.starts_with(magic)) {
        return mime;
    }
    if !bytes.is_empty() && !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok() {
        return TEXT_PLAIN;
    }
    OCTET_STREAM
}
