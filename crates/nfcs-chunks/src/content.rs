//! Content normalization: file bytes <-> text safe for partition encryption
//!
//! Textual MIME types (`text/*`, `application/json`, `application/xml`) pass
//! through as UTF-8; everything else is base64-encoded. The encoding chosen at
//! encrypt time is persisted in the record, so the decrypt side does not have
//! to guess. Records written without it fall back to classifying the stored
//! file name's extension through `MIME_TABLE`.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use nfcs_core::{ContentEncoding, EncryptedFileRecord, NfcsError, NfcsResult};

/// Fallback when an extension is not in the table
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extension -> MIME mapping used to classify stored file names
pub const MIME_TABLE: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("pdf", "application/pdf"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("mp4", "video/mp4"),
    ("mp3", "audio/mpeg"),
];

/// Extra entries consulted only when guessing an input file's MIME type
const INPUT_MIME_TABLE: &[(&str, &str)] = &[
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("csv", "text/csv"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("htm", "text/html"),
];

fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}

fn lookup(table: &[(&str, &'static str)], ext: &str) -> Option<&'static str> {
    table.iter().find(|(e, _)| *e == ext).map(|(_, m)| *m)
}

/// MIME type for a stored file name, via `MIME_TABLE`.
pub fn mime_for_file_name(file_name: &str) -> &'static str {
    extension(file_name)
        .and_then(|ext| lookup(MIME_TABLE, &ext))
        .unwrap_or(OCTET_STREAM)
}

/// Best-effort MIME type for a local input file.
pub fn guess_mime(file_name: &str) -> &'static str {
    extension(file_name)
        .and_then(|ext| lookup(MIME_TABLE, &ext).or_else(|| lookup(INPUT_MIME_TABLE, &ext)))
        .unwrap_or(OCTET_STREAM)
}

/// Textual MIME types are split as text, everything else as base64.
pub fn classify_mime(mime: &str) -> ContentEncoding {
    let mime = mime.trim().to_ascii_lowercase();
    if mime.starts_with("text/")
        || mime.starts_with("application/json")
        || mime.starts_with("application/xml")
    {
        ContentEncoding::Text
    } else {
        ContentEncoding::Base64
    }
}

/// Turn raw file bytes into the string that gets split and encrypted.
pub fn normalize(bytes: &[u8], mime: &str) -> NfcsResult<(String, ContentEncoding)> {
    let encoding = classify_mime(mime);
    let text = match encoding {
        ContentEncoding::Text => std::str::from_utf8(bytes)
            .map_err(|e| {
                NfcsError::validation(format!("content declared as {mime} is not UTF-8: {e}"))
            })?
            .to_string(),
        ContentEncoding::Base64 => STANDARD.encode(bytes),
    };
    Ok((text, encoding))
}

/// Inverse of `normalize`.
///
/// Base64 content that fails to decode is handed back as its text bytes
/// rather than dropped.
pub fn materialize(content: String, encoding: ContentEncoding) -> Vec<u8> {
    match encoding {
        ContentEncoding::Text => content.into_bytes(),
        ContentEncoding::Base64 => match decode_base64(&content) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("reassembled content is not valid base64, keeping text: {e}");
                content.into_bytes()
            }
        },
    }
}

fn decode_base64(s: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(s)
        .map_err(|e| anyhow::anyhow!("base64 decode: {e}"))
}

/// Encoding to reverse for a stored record.
pub fn encoding_for_record(record: &EncryptedFileRecord) -> ContentEncoding {
    record
        .content_encoding
        .unwrap_or_else(|| classify_mime(mime_for_file_name(&record.file_name)))
}
