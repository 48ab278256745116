//! Filename handling for untrusted client input.
//!
//! Two separate concerns live here:
//! - [`sanitize`] turns any name into something safe to use as an object key.
//! - [`has_suspicious_double_extension`] inspects the *original* client name
//!   for polyglot tricks such as `invoice.pdf.exe` or `photo.jpg.png`.
//!
//! The double-extension check is a heuristic over names, not content sniffing.

use thiserror::Error;

/// Extensions that must never appear in the middle of a name.
pub const BLOCKED_EXTENSIONS: [&str; 13] = [
    "exe", "com", "bat", "cmd", "sh", "msi", "js", "jar", "vbs", "ps1", "php", "py", "rb",
];

/// Returned when a name has nothing left after sanitizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid file name")]
pub struct InvalidName;

/// Strip path separators and parent-directory sequences, then trim whitespace.
///
/// Separators go first so that inputs like `.\.` cannot collapse into `..`
/// after removal. `..` pairs are removed left to right, so an even run of
/// dots disappears and an odd run leaves a single dot. The output never
/// contains `..` and the function is idempotent.
pub fn sanitize(raw: &str) -> Result<String, InvalidName> {
    let without_separators: String = raw.chars().filter(|c| !matches!(c, '/' | '\\')).collect();
    let without_parents = without_separators.replace("..", "");
    let trimmed = without_parents.trim();

    if trimmed.is_empty() {
        return Err(InvalidName);
    }
    Ok(trimmed.to_string())
}

/// Lower-cased extension of the last path component, without the dot.
///
/// Follows the usual "extname" rules: a leading dot does not start an
/// extension (`.env` has none) and a trailing dot yields none.
pub fn extension_of(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let idx = base.rfind('.')?;
    if idx == 0 || idx + 1 == base.len() {
        return None;
    }
    Some(base[idx + 1..].to_lowercase())
}

/// Detect blocked-extension chains and stacked allow-listed extensions.
///
/// A lone executable extension (`setup.exe`) is not a chain and is left to
/// the extension allow-list.
///
/// `allowed` holds lower-case extensions without the leading dot.
pub fn has_suspicious_double_extension<S: AsRef<str>>(original_name: &str, allowed: &[S]) -> bool {
    let normalized: String = original_name
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if BLOCKED_EXTENSIONS
        .iter()
        .any(|ext| normalized.contains(&format!(".{ext}.")))
    {
        return true;
    }

    let Some((stem, last)) = normalized.rsplit_once('.') else {
        return false;
    };
    let Some((_, previous)) = stem.rsplit_once('.') else {
        return false;
    };

    // A trailing executable behind another extension (`invoice.pdf.exe`).
    if BLOCKED_EXTENSIONS.contains(&last) && !previous.is_empty() {
        return true;
    }

    let is_allowed = |ext: &str| allowed.iter().any(|a| a.as_ref() == ext);
    is_allowed(last) && is_allowed(previous)
}
