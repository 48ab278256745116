//! Upload policy and the ordered validation pipeline.
//!
//! [`validate`] runs the checks below in a fixed order and stops at the
//! first failure:
//!
//! 1. [`check_present`]: a file was sent at all
//! 2. [`check_size`]: payload within the configured ceiling
//! 3. [`check_name`]: no double-extension tricks in the client filename
//! 4. [`check_extension`]: extension is on the allow-list
//! 5. [`check_mime_type`]: declared MIME type is on the allow-list
//!
//! Extension and declared MIME type are both chosen by the client. Checking
//! both narrows spoofing but is a policy boundary, not a guarantee about
//! what the bytes actually contain.

use crate::models::upload::UploadCandidate;
use crate::services::sanitizer::{extension_of, has_suspicious_double_extension};
use thiserror::Error;

/// Default size ceiling: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Default extension to MIME type table.
pub const DEFAULT_FILE_TYPES: [(&str, &str); 7] = [
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
];

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no file was provided")]
    MissingFile,
    #[error("file exceeds the maximum allowed size of {max_bytes} bytes")]
    TooLarge { max_bytes: u64 },
    #[error("invalid file name")]
    InvalidName,
    #[error("file name is invalid or contains dangerous extensions")]
    SuspiciousName,
    #[error("file type not allowed; allowed extensions: {allowed}")]
    DisallowedExtension { allowed: String },
    #[error("MIME type `{0}` is not allowed")]
    DisallowedMimeType(String),
}

pub type ValidationResult = Result<(), ValidationError>;

/// One allow-listed file type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileType {
    /// Lower-case extension without the leading dot.
    pub extension: String,
    pub mime_type: String,
}

/// Size ceiling plus the extension/MIME allow-list.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: u64,
    pub file_types: Vec<FileType>,
}

/// [`DEFAULT_FILE_TYPES`] as an owned allow-list.
pub fn default_file_types() -> Vec<FileType> {
    DEFAULT_FILE_TYPES
        .iter()
        .map(|(ext, mime)| FileType {
            extension: (*ext).to_string(),
            mime_type: (*mime).to_string(),
        })
        .collect()
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES, default_file_types())
    }
}

impl UploadPolicy {
    pub fn new(max_bytes: u64, file_types: Vec<FileType>) -> Self {
        Self {
            max_bytes,
            file_types,
        }
    }

    pub fn extensions(&self) -> Vec<&str> {
        self.file_types.iter().map(|t| t.extension.as_str()).collect()
    }

    pub fn allows_extension(&self, extension: &str) -> bool {
        self.file_types.iter().any(|t| t.extension == extension)
    }

    pub fn allows_mime_type(&self, mime_type: &str) -> bool {
        self.file_types
            .iter()
            .any(|t| t.mime_type.eq_ignore_ascii_case(mime_type))
    }

    fn allowed_extensions_display(&self) -> String {
        self.file_types
            .iter()
            .map(|t| format!(".{}", t.extension))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// MIME type for a key or filename, from the static default table.
///
/// Used when the store has no content type recorded for an object.
pub fn mime_for_name(name: &str) -> &'static str {
    extension_of(name)
        .and_then(|ext| {
            DEFAULT_FILE_TYPES
                .iter()
                .find(|(candidate, _)| *candidate == ext)
                .map(|(_, mime)| *mime)
        })
        .unwrap_or(FALLBACK_MIME_TYPE)
}

pub fn check_present(candidate: Option<&UploadCandidate>) -> Result<&UploadCandidate, ValidationError> {
    candidate.ok_or(ValidationError::MissingFile)
}

pub fn check_size(candidate: &UploadCandidate, policy: &UploadPolicy) -> ValidationResult {
    if candidate.size_bytes > policy.max_bytes {
        return Err(ValidationError::TooLarge {
            max_bytes: policy.max_bytes,
        });
    }
    Ok(())
}

pub fn check_name(candidate: &UploadCandidate, policy: &UploadPolicy) -> ValidationResult {
    if candidate.original_name.trim().is_empty() {
        return Err(ValidationError::InvalidName);
    }
    if has_suspicious_double_extension(&candidate.original_name, &policy.extensions()) {
        return Err(ValidationError::SuspiciousName);
    }
    Ok(())
}

pub fn check_extension(candidate: &UploadCandidate, policy: &UploadPolicy) -> ValidationResult {
    match extension_of(&candidate.original_name) {
        Some(ext) if policy.allows_extension(&ext) => Ok(()),
        _ => Err(ValidationError::DisallowedExtension {
            allowed: policy.allowed_extensions_display(),
        }),
    }
}

pub fn check_mime_type(candidate: &UploadCandidate, policy: &UploadPolicy) -> ValidationResult {
    if policy.allows_mime_type(&candidate.mime_type) {
        Ok(())
    } else {
        Err(ValidationError::DisallowedMimeType(candidate.mime_type.clone()))
    }
}

/// Run the full pipeline against a candidate.
pub fn validate(candidate: Option<&UploadCandidate>, policy: &UploadPolicy) -> ValidationResult {
    let candidate = check_present(candidate)?;
    check_size(candidate, policy)?;
    check_name(candidate, policy)?;
    check_extension(candidate, policy)?;
    check_mime_type(candidate, policy)
}
