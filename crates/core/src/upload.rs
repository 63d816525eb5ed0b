//! Upload acceptance rules.
//!
//! Only office documents the converter handles are accepted, and the
//! declared content type must match the file extension. Rejection happens
//! before any job exists.

use crate::error::CoreError;

/// Accepted document kinds: (extension, content type).
pub const ACCEPTED_DOCUMENTS: &[(&str, &str)] = &[
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("odt", "application/vnd.oasis.opendocument.text"),
];

/// An upload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedUpload {
    /// Bare file name (no directory components), as the user named it.
    pub filename: String,
    /// Lowercased extension without the dot.
    pub extension: &'static str,
}

/// Validate an uploaded file's name and declared content type.
pub fn validate_upload(
    filename: &str,
    content_type: Option<&str>,
) -> Result<AcceptedUpload, CoreError> {
    let filename = sanitize_filename(filename)
        .ok_or_else(|| CoreError::Validation("Missing file name".into()))?;

    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let (extension, expected_type) = ACCEPTED_DOCUMENTS
        .iter()
        .find(|(allowed, _)| *allowed == ext)
        .copied()
        .ok_or_else(|| {
            CoreError::Validation("Invalid file type. Allowed types: .docx, .xlsx, .odt".into())
        })?;

    let declared = content_type.map(essence).unwrap_or_default();
    if !declared.eq_ignore_ascii_case(expected_type) {
        return Err(CoreError::Validation(format!(
            "Invalid content type '{declared}' for .{extension} file"
        )));
    }

    Ok(AcceptedUpload {
        filename,
        extension,
    })
}

/// Reduce a client-supplied file name to its final path component.
///
/// Returns `None` when nothing usable remains (empty, `.` or `..`).
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// Strip media-type parameters (`; charset=...`).
fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}
