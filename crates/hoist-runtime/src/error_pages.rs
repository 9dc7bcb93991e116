//! Error page substitution.
//!
//! Responses with a 4xx or 5xx status get their body replaced by an HTML
//! page. Pages are looked up in this order:
//!
//! 1. `<dir>/<status>.html`, e.g. `404.html`
//! 2. `<dir>/<class>xx.html`, e.g. `5xx.html`
//! 3. `<dir>/error.html`
//! 4. the `pages` map of the configuration, keyed by status
//! 5. the built-in page
//!
//! Templates may use `{{status}}`, `{{status_text}}`, `{{request_id}}`,
//! `{{color}}` and `{{support_email}}`.

use std::collections::HashMap;
use std::path::Path;

use http::StatusCode;
use indexmap::IndexMap;

use hoist_config::{ErrorPageVariables, ErrorPagesSettings};
use hoist_core::{RequestId, Response};

/// Built-in error page.
pub const DEFAULT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{status_text}}</title>
<style>
body { font: 15px -apple-system, BlinkMacSystemFont, "Helvetica Neue", Helvetica, Arial, sans-serif; color: #333; margin: 0; }
.page { max-width: 480px; margin: 120px auto; text-align: center; }
.status { color: {{color}}; font-size: 48px; font-weight: 300; margin: 0; }
.message { font-size: 18px; margin: 8px 0 24px; }
.request-id { color: #999; font-size: 12px; }
</style>
</head>
<body>
<div class="page">
<p class="status">{{status}}</p>
<p class="message">{{status_text}}</p>
<p class="request-id">Request ID: {{request_id}}</p>
</div>
</body>
</html>
"#;

/// Renders error pages for failed responses.
#[derive(Debug, Clone, Default)]
pub struct ErrorPages {
    disabled: bool,
    files: HashMap<String, String>,
    pages: IndexMap<String, String>,
    variables: ErrorPageVariables,
}

impl ErrorPages {
    /// Builds the renderer, reading the pages directory once.
    ///
    /// An unreadable directory is logged and ignored.
    pub fn from_config(settings: &ErrorPagesSettings) -> Self {
        let files = settings
            .dir
            .as_deref()
            .filter(|_| !settings.disable)
            .map(load_dir)
            .unwrap_or_default();

        Self {
            disabled: settings.disable,
            files,
            pages: settings.pages.clone(),
            variables: settings.variables.clone(),
        }
    }

    /// Template used for `status`.
    pub fn template(&self, status: StatusCode) -> &str {
        let code = status.as_u16();
        let candidates = [
            format!("{code}.html"),
            format!("{}xx.html", code / 100),
            "error.html".to_string(),
        ];

        candidates
            .iter()
            .find_map(|name| self.files.get(name))
            .or_else(|| self.pages.get(&code.to_string()))
            .map_or(DEFAULT_TEMPLATE, String::as_str)
    }

    /// Renders the page for `status`.
    pub fn render(&self, status: StatusCode, request_id: &RequestId) -> String {
        let status_text = status.canonical_reason().unwrap_or("Error");
        let code = status.as_u16().to_string();
        let support_email = self.variables.support_email.as_deref().unwrap_or("");

        [
            ("{{status}}", code.as_str()),
            ("{{status_text}}", status_text),
            ("{{request_id}}", request_id.as_str()),
            ("{{color}}", self.variables.color.as_str()),
            ("{{support_email}}", support_email),
        ]
        .into_iter()
        .fold(self.template(status).to_string(), |page, (placeholder, value)| {
            page.replace(placeholder, &escape(value))
        })
    }

    /// Substitutes the body of an error response. Other responses pass
    /// through unchanged.
    pub fn apply(&self, mut response: Response, request_id: &RequestId) -> Response {
        if self.disabled || !response.is_error() {
            return response;
        }

        let page = self.render(response.status, request_id);
        response.headers.remove("content-encoding");
        response
            .headers
            .insert("Content-Type", "text/html; charset=utf-8");
        response
            .headers
            .insert("Content-Length", page.len().to_string());
        response.body = page.into();
        response.binary = false;
        response
    }
}

fn load_dir(dir: &Path) -> HashMap<String, String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot read error pages directory");
            return HashMap::new();
        }
    };

    let mut files = HashMap::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_page_name(name) {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                files.insert(name.to_string(), content);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read error page");
            }
        }
    }
    tracing::debug!(dir = %dir.display(), pages = files.len(), "loaded error pages");
    files
}

fn is_page_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".html") else {
        return false;
    };
    let bytes = stem.as_bytes();
    stem == "error"
        || (bytes.len() == 3 && bytes.iter().all(u8::is_ascii_digit))
        || (bytes.len() == 3 && bytes[0].is_ascii_digit() && &bytes[1..] == b"xx")
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn settings() -> ErrorPagesSettings {
        ErrorPagesSettings::default()
    }

    #[test]
    fn test_default_page_carries_request_id() {
        let pages = ErrorPages::from_config(&settings());
        let response = Response::json(StatusCode::BAD_GATEWAY, &"upstream down")
            .with_header("Content-Encoding", "gzip")
            .with_binary(true);

        let response = pages.apply(response, &"req-42".into());
        let body = String::from_utf8(response.body.to_vec()).unwrap();

        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(response.header("content-length"), Some(body.len().to_string().as_str()));
        assert!(response.header("content-encoding").is_none());
        assert!(!response.binary);
        assert!(body.contains("Request ID: req-42"));
        assert!(body.contains("Bad Gateway"));
        assert!(body.contains("#228ae6"));
    }

    #[test]
    fn test_success_untouched() {
        let pages = ErrorPages::from_config(&settings());
        let ok = Response::html(StatusCode::OK, "<p>fine</p>");
        assert_eq!(pages.apply(ok.clone(), &"r".into()), ok);
    }

    #[test]
    fn test_disabled_passes_through() {
        let pages = ErrorPages::from_config(&ErrorPagesSettings {
            disable: true,
            ..settings()
        });
        let error = Response::json(StatusCode::NOT_FOUND, &"nope");
        assert_eq!(pages.apply(error.clone(), &"r".into()), error);
    }

    #[test]
    fn test_directory_lookup_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("404.html"), "exact {{status}}").unwrap();
        fs::write(dir.path().join("5xx.html"), "class {{status_text}}").unwrap();
        fs::write(dir.path().join("error.html"), "generic {{status}}").unwrap();
        fs::write(dir.path().join("notes.html"), "ignored").unwrap();

        let pages = ErrorPages::from_config(&ErrorPagesSettings {
            dir: Some(dir.path().to_path_buf()),
            ..settings()
        });

        assert_eq!(pages.render(StatusCode::NOT_FOUND, &"r".into()), "exact 404");
        assert_eq!(
            pages.render(StatusCode::SERVICE_UNAVAILABLE, &"r".into()),
            "class Service Unavailable"
        );
        assert_eq!(pages.render(StatusCode::FORBIDDEN, &"r".into()), "generic 403");
    }

    #[test]
    fn test_config_pages_and_variables() {
        let mut config = settings();
        config
            .pages
            .insert("404".to_string(), "<a href=\"mailto:{{support_email}}\">{{request_id}}</a>".to_string());
        config.variables.support_email = Some("help@example.com".to_string());

        let pages = ErrorPages::from_config(&config);
        assert_eq!(
            pages.render(StatusCode::NOT_FOUND, &"<id>".into()),
            "<a href=\"mailto:help@example.com\">&lt;id&gt;</a>"
        );
        assert_eq!(pages.template(StatusCode::GONE), DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_missing_directory_falls_back() {
        let pages = ErrorPages::from_config(&ErrorPagesSettings {
            dir: Some("/nonexistent/hoist/pages".into()),
            ..settings()
        });
        assert_eq!(pages.template(StatusCode::NOT_FOUND), DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_page_names() {
        assert!(is_page_name("404.html"));
        assert!(is_page_name("4xx.html"));
        assert!(is_page_name("error.html"));
        assert!(!is_page_name("index.html"));
        assert!(!is_page_name("40.html"));
        assert!(!is_page_name("404.htm"));
    }
}
