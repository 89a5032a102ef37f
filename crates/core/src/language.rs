//! Target languages accepted for resume generation.

use crate::error::CoreError;

/// Language codes the document generator can render.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "fr", "de", "es", "it", "pt", "nl", "ar"];

/// Default language when a caller does not specify one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Normalise and validate a language code.
///
/// Accepts any casing and surrounding whitespace (`" EN "` → `"en"`).
pub fn normalize_language(raw: &str) -> Result<String, CoreError> {
    let code = raw.trim().to_ascii_lowercase();
    if SUPPORTED_LANGUAGES.contains(&code.as_str()) {
        Ok(code)
    } else {
        Err(CoreError::Validation(format!(
            "Unsupported language '{}'. Must be one of: {SUPPORTED_LANGUAGES:?}",
            raw.trim()
        )))
    }
}
