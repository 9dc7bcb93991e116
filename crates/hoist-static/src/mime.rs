//! Content types and the text/binary split.

use std::collections::HashMap;
use std::path::Path;

use hoist_core::base_content_type;

/// Content type for a file extension (without the dot), from the built-in
/// table. Unknown extensions are `application/octet-stream`.
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        // Text
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",

        // Images
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "avif" => "image/avif",

        // Fonts
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",

        // Documents and archives
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",

        // Media
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",

        // Web
        "wasm" => "application/wasm",
        "webmanifest" => "application/manifest+json",

        _ => "application/octet-stream",
    }
}

/// Content types that are text in addition to every `text/*` type and any
/// `+json` or `+xml` suffix.
pub const DEFAULT_TEXT_TYPES: &[&str] = &[
    "application/json",
    "application/javascript",
    "application/xml",
    "application/x-www-form-urlencoded",
    "application/graphql",
    "image/svg+xml",
];

/// Decides whether a body can travel as text or must be base64-encoded.
#[derive(Debug, Clone, Default)]
pub struct TextTypes {
    extra: Vec<String>,
}

impl TextTypes {
    /// Built-in list plus `extra` content types.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extra: extra
                .into_iter()
                .map(|t| base_content_type(t.as_ref()))
                .collect(),
        }
    }

    /// Returns `true` if `content_type` is text.
    ///
    /// # Example
    ///
    /// ```
    /// use hoist_static::TextTypes;
    ///
    /// let types = TextTypes::default();
    /// assert!(types.is_text("text/html; charset=utf-8"));
    /// assert!(types.is_text("application/problem+json"));
    /// assert!(!types.is_text("image/png"));
    /// ```
    pub fn is_text(&self, content_type: &str) -> bool {
        let base = base_content_type(content_type);
        base.starts_with("text/")
            || base.ends_with("+json")
            || base.ends_with("+xml")
            || DEFAULT_TEXT_TYPES.contains(&base.as_str())
            || self.extra.iter().any(|t| *t == base)
    }
}

/// Looks up a content type for `path`, preferring `overrides` (keyed by
/// lowercase extension).
pub(crate) fn detect(path: &Path, overrides: &HashMap<String, String>) -> String {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    overrides
        .get(&extension)
        .map_or_else(|| content_type_for_extension(&extension).to_string(), Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        assert_eq!(content_type_for_extension("HTML"), "text/html; charset=utf-8");
        assert_eq!(content_type_for_extension("png"), "image/png");
        assert_eq!(content_type_for_extension("unknown"), "application/octet-stream");
    }

    #[test]
    fn test_text_types() {
        let types = TextTypes::new(["application/x-ndjson"]);
        assert!(types.is_text("application/JSON"));
        assert!(types.is_text("application/atom+xml"));
        assert!(types.is_text("application/x-ndjson; charset=utf-8"));
        assert!(!types.is_text("application/octet-stream"));
        assert!(!types.is_text("font/woff2"));
    }

    #[test]
    fn test_detect_prefers_override() {
        let overrides = HashMap::from([("wasm".to_string(), "application/x-custom".to_string())]);
        assert_eq!(detect(Path::new("app.WASM"), &overrides), "application/x-custom");
        assert_eq!(
            detect(Path::new("a.css"), &overrides),
            "text/css; charset=utf-8"
        );
    }
}
