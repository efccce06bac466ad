//! Name sanitization and generated storage filenames.

use std::path::Path;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

pub(crate) fn is_illegal_segment_char(ch: char) -> bool {
    ch == '\0' || (ch != '/' && ILLEGAL_CHARS.contains(&ch))
}

/// Cleans a user-typed folder or rename segment: illegal characters become
/// `_`, and a result that is empty or a relative-path token is refused.
pub fn sanitize_segment(raw: &str) -> Result<String, AppError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|ch| {
            if ch == '\0' || ILLEGAL_CHARS.contains(&ch) {
                '_'
            } else {
                ch
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return Err(AppError::InvalidName(raw.to_string()));
    }
    Ok(cleaned)
}

/// Unique on-disk filename for an upload: unix millis plus a v4 uuid, keeping
/// the original extension so content types stay guessable.
pub fn storage_name(original: &str) -> String {
    let extension = Path::new(original)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let safe: String = ext
                .chars()
                .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_'))
                .collect();
            if safe.is_empty() {
                String::new()
            } else {
                format!(".{safe}")
            }
        })
        .unwrap_or_default();

    format!(
        "{}-{}{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4(),
        extension
    )
}
