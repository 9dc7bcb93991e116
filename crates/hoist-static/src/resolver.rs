//! Document-root file resolver.
//!
//! Maps a request path onto a file under the configured root and builds the
//! response for it, including conditional GET handling.
//!
//! # Security
//!
//! - `..` components are rejected with 403 before touching the filesystem
//! - the resolved path is canonicalized and must stay under the canonical
//!   root, so symlinks escaping the root are also 403
//! - hidden files and directories (leading `.`) are reported as 404

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use http::{Method, StatusCode};
use sha1::{Digest, Sha1};

use hoist_config::StaticSettings;
use hoist_core::{HoistError, Request, Response};

use crate::error::StaticFileError;
use crate::mime::{self, TextTypes};

/// Serves files from a document root.
///
/// # Example
///
/// ```
/// use hoist_static::Resolver;
///
/// let resolver = Resolver::new("./public")
///     .spa_fallback("index.html")
///     .cache_control("public, max-age=300")
///     .mime_type("wasm", "application/wasm");
///
/// assert_eq!(resolver.root(), std::path::Path::new("./public"));
/// ```
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
    index: String,
    spa_fallback: Option<String>,
    cache_control: Option<String>,
    mime_types: HashMap<String, String>,
    text_types: TextTypes,
}

impl Resolver {
    /// Creates a resolver for `root` with `index.html` as the index document.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            index: "index.html".to_string(),
            spa_fallback: None,
            cache_control: None,
            mime_types: HashMap::new(),
            text_types: TextTypes::default(),
        }
    }

    /// Builds a resolver from the `static` configuration section.
    pub fn from_config(settings: &StaticSettings) -> Self {
        let mut resolver = Self::new(&settings.dir).index(&settings.index);
        resolver.spa_fallback = settings.spa_fallback.clone();
        resolver.cache_control = settings.cache_control.clone();
        for (extension, content_type) in &settings.mime_types {
            resolver = resolver.mime_type(extension, content_type);
        }
        resolver.text_types = TextTypes::new(&settings.text_types);
        resolver
    }

    /// Sets the index document appended to directory paths.
    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    /// Sets the document served with 200 when nothing else matches.
    #[must_use]
    pub fn spa_fallback(mut self, document: impl Into<String>) -> Self {
        self.spa_fallback = Some(document.into());
        self
    }

    /// Sets the `Cache-Control` value for served files.
    #[must_use]
    pub fn cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    /// Overrides the content type for an extension (without the dot).
    #[must_use]
    pub fn mime_type(mut self, extension: &str, content_type: impl Into<String>) -> Self {
        self.mime_types.insert(
            extension.trim_start_matches('.').to_ascii_lowercase(),
            content_type.into(),
        );
        self
    }

    /// Returns the document root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `request` to a response. Failures become error responses
    /// carrying the request id.
    pub fn resolve(&self, request: &Request) -> Response {
        match self.serve(request) {
            Ok(response) => response,
            Err(err) => {
                if let StaticFileError::Io(ref e) = err {
                    tracing::warn!(path = request.path(), error = %e, "static file read failed");
                } else {
                    tracing::debug!(path = request.path(), error = %err, "static resolve failed");
                }
                HoistError::from(err).into_response(request.request_id())
            }
        }
    }

    /// Resolves `request` to a response or a typed error.
    ///
    /// # Errors
    ///
    /// - [`StaticFileError::MethodNotAllowed`] for anything but GET and HEAD
    /// - [`StaticFileError::Forbidden`] for `..` or paths escaping the root
    /// - [`StaticFileError::NotFound`] for hidden or missing files when no
    ///   SPA fallback is configured
    /// - [`StaticFileError::Io`] when the root or a file cannot be read
    pub fn serve(&self, request: &Request) -> Result<Response, StaticFileError> {
        let method = request.method();
        if method != Method::GET && method != Method::HEAD {
            return Err(StaticFileError::MethodNotAllowed(method.to_string()));
        }

        let relative = relative_path(request.path())?;
        if let Some(file) = self.locate(&relative)? {
            return self.serve_file(&file, request);
        }

        if let Some(ref fallback) = self.spa_fallback {
            if let Some(file) = self.locate(&relative_path(fallback)?)? {
                tracing::trace!(path = request.path(), fallback = %fallback, "serving SPA fallback");
                return self.serve_file(&file, request);
            }
        }

        Err(StaticFileError::NotFound(request.path().to_string()))
    }

    /// Finds the file for `relative`, appending the index document to
    /// directories. `Ok(None)` means nothing is there.
    fn locate(&self, relative: &Path) -> Result<Option<PathBuf>, StaticFileError> {
        let mut full = self.root.join(relative);
        if full.is_dir() {
            full.push(&self.index);
        }

        let canonical = match full.canonicalize() {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let canonical_root = self.root.canonicalize()?;

        if !canonical.starts_with(&canonical_root) {
            return Err(StaticFileError::Forbidden(relative.display().to_string()));
        }
        Ok(canonical.is_file().then_some(canonical))
    }

    fn serve_file(&self, path: &Path, request: &Request) -> Result<Response, StaticFileError> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata.modified().ok();
        let contents = std::fs::read(path)?;
        let etag = format!("\"{}\"", hex(&Sha1::digest(&contents)));

        if is_not_modified(request, &etag, modified) {
            return Ok(self.not_modified_response(&etag, modified));
        }

        let content_type = mime::detect(path, &self.mime_types);
        let mut response = Response::new(StatusCode::OK)
            .with_header("Content-Type", content_type.as_str())
            .with_header("Content-Length", contents.len().to_string())
            .with_header("ETag", etag)
            .with_binary(!self.text_types.is_text(&content_type));
        if let Some(modified) = modified {
            response = response.with_header("Last-Modified", httpdate::fmt_http_date(modified));
        }
        if let Some(ref cache_control) = self.cache_control {
            response = response.with_header("Cache-Control", cache_control.as_str());
        }
        if request.method() != Method::HEAD {
            response.body = Bytes::from(contents);
        }
        Ok(response)
    }

    fn not_modified_response(&self, etag: &str, modified: Option<SystemTime>) -> Response {
        let mut response = Response::new(StatusCode::NOT_MODIFIED).with_header("ETag", etag);
        if let Some(modified) = modified {
            response = response.with_header("Last-Modified", httpdate::fmt_http_date(modified));
        }
        if let Some(ref cache_control) = self.cache_control {
            response = response.with_header("Cache-Control", cache_control.as_str());
        }
        response
    }
}

/// Converts a request path into a path relative to the root.
fn relative_path(request_path: &str) -> Result<PathBuf, StaticFileError> {
    let mut relative = PathBuf::new();
    for component in Path::new(request_path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(name) => {
                if name.to_str().is_some_and(|n| n.starts_with('.')) {
                    return Err(StaticFileError::NotFound(request_path.to_string()));
                }
                relative.push(name);
            }
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(StaticFileError::Forbidden(request_path.to_string()));
            }
        }
    }
    Ok(relative)
}

/// `If-None-Match` wins over `If-Modified-Since` when both are sent.
fn is_not_modified(request: &Request, etag: &str, modified: Option<SystemTime>) -> bool {
    if let Some(if_none_match) = request.header("if-none-match") {
        return if_none_match.split(',').map(str::trim).any(|candidate| {
            candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
        });
    }

    let (Some(modified), Some(since)) = (
        modified,
        request
            .header("if-modified-since")
            .and_then(|v| httpdate::parse_http_date(v).ok()),
    ) else {
        return false;
    };
    match (
        modified.duration_since(SystemTime::UNIX_EPOCH),
        since.duration_since(SystemTime::UNIX_EPOCH),
    ) {
        (Ok(modified), Ok(since)) => modified.as_secs() <= since.as_secs(),
        _ => false,
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();

        fs::write(dir.path().join("index.html"), "<h1>Home</h1>").unwrap();
        fs::write(dir.path().join("style.css"), "body { color: red }").unwrap();
        fs::write(dir.path().join("image.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
        fs::write(dir.path().join("app.wasm"), [0, 97, 115, 109]).unwrap();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();

        let sub = dir.path().join("docs");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("index.html"), "<h1>Docs</h1>").unwrap();

        dir
    }

    fn get(path: &str) -> Request {
        Request::builder(Method::GET, path).build()
    }

    #[test]
    fn test_root_serves_index() {
        let dir = create_test_dir();
        let response = Resolver::new(dir.path()).resolve(&get("/"));

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.as_ref(), b"<h1>Home</h1>");
        assert_eq!(response.media_type().as_deref(), Some("text/html"));
        assert_eq!(response.header("content-length"), Some("13"));
        assert!(!response.binary);
    }

    #[test]
    fn test_missing_is_not_found() {
        let dir = create_test_dir();
        let resolver = Resolver::new(dir.path());

        assert_eq!(resolver.resolve(&get("/missing")).status, StatusCode::NOT_FOUND);
        assert!(matches!(
            resolver.serve(&get("/missing")),
            Err(StaticFileError::NotFound(_))
        ));
    }

    #[test]
    fn test_subdirectory_index() {
        let dir = create_test_dir();
        let resolver = Resolver::new(dir.path());

        for path in ["/docs", "/docs/"] {
            let response = resolver.resolve(&get(path));
            assert_eq!(response.status, StatusCode::OK, "{path}");
            assert_eq!(response.body.as_ref(), b"<h1>Docs</h1>");
        }
    }

    #[test]
    fn test_spa_fallback() {
        let dir = create_test_dir();
        let resolver = Resolver::new(dir.path()).spa_fallback("index.html");

        let response = resolver.resolve(&get("/app/settings/profile"));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.as_ref(), b"<h1>Home</h1>");
    }

    #[test]
    fn test_traversal_forbidden() {
        let dir = create_test_dir();
        let resolver = Resolver::new(dir.path());

        for path in ["/../etc/passwd", "/docs/../../secret", "/docs/../index.html"] {
            assert!(
                matches!(resolver.serve(&get(path)), Err(StaticFileError::Forbidden(_))),
                "{path}"
            );
        }
        assert_eq!(resolver.resolve(&get("/../x")).status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_traversal_not_rescued_by_fallback() {
        let dir = create_test_dir();
        let resolver = Resolver::new(dir.path()).spa_fallback("index.html");
        assert_eq!(resolver.resolve(&get("/../x")).status, StatusCode::FORBIDDEN);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_root_forbidden() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();

        let dir = create_test_dir();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("link.txt"))
            .unwrap();

        let response = Resolver::new(dir.path()).resolve(&get("/link.txt"));
        assert_eq!(response.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_hidden_file_not_found() {
        let dir = create_test_dir();
        let resolver = Resolver::new(dir.path()).spa_fallback("index.html");
        assert_eq!(resolver.resolve(&get("/.env")).status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_method_not_allowed() {
        let dir = create_test_dir();
        let request = Request::builder(Method::POST, "/").body("x").build();
        assert_eq!(
            Resolver::new(dir.path()).resolve(&request).status,
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_head_has_headers_without_body() {
        let dir = create_test_dir();
        let request = Request::builder(Method::HEAD, "/style.css").build();
        let response = Resolver::new(dir.path()).resolve(&request);

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body.is_empty());
        assert_eq!(response.header("content-length"), Some("19"));
        assert_eq!(response.header("content-type"), Some("text/css; charset=utf-8"));
    }

    #[test]
    fn test_etag_conditional_get() {
        let dir = create_test_dir();
        let resolver = Resolver::new(dir.path());

        let first = resolver.resolve(&get("/style.css"));
        let etag = first.header("etag").unwrap().to_string();
        assert!(etag.starts_with('"') && etag.len() == 42);

        let request = Request::builder(Method::GET, "/style.css")
            .header("If-None-Match", format!("\"other\", W/{etag}"))
            .build();
        let response = resolver.resolve(&request);
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert!(response.body.is_empty());
        assert_eq!(response.header("etag"), Some(etag.as_str()));

        let request = Request::builder(Method::GET, "/style.css")
            .header("If-None-Match", "*")
            .build();
        assert_eq!(resolver.resolve(&request).status, StatusCode::NOT_MODIFIED);

        let request = Request::builder(Method::GET, "/style.css")
            .header("If-None-Match", "\"stale\"")
            .build();
        assert_eq!(resolver.resolve(&request).status, StatusCode::OK);
    }

    #[test]
    fn test_if_modified_since() {
        let dir = create_test_dir();
        let resolver = Resolver::new(dir.path());

        let future = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(3600));
        let request = Request::builder(Method::GET, "/style.css")
            .header("If-Modified-Since", future)
            .build();
        assert_eq!(resolver.resolve(&request).status, StatusCode::NOT_MODIFIED);

        let past = httpdate::fmt_http_date(SystemTime::UNIX_EPOCH + Duration::from_secs(86400));
        let request = Request::builder(Method::GET, "/style.css")
            .header("If-Modified-Since", past)
            .build();
        let response = resolver.resolve(&request);
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.header("last-modified").is_some());
    }

    #[test]
    fn test_binary_flag_and_mime_override() {
        let dir = create_test_dir();
        let resolver = Resolver::new(dir.path()).mime_type(".WASM", "application/x-custom-wasm");

        let png = resolver.resolve(&get("/image.png"));
        assert_eq!(png.header("content-type"), Some("image/png"));
        assert!(png.binary);

        let wasm = resolver.resolve(&get("/app.wasm"));
        assert_eq!(wasm.header("content-type"), Some("application/x-custom-wasm"));
        assert!(wasm.binary);
    }

    #[test]
    fn test_from_config() {
        let dir = create_test_dir();
        let mut settings = StaticSettings {
            dir: dir.path().to_path_buf(),
            cache_control: Some("public, max-age=60".to_string()),
            text_types: vec!["image/png".to_string()],
            ..StaticSettings::default()
        };
        settings
            .mime_types
            .insert("css".to_string(), "text/x-styles".to_string());
        let resolver = Resolver::from_config(&settings);

        let css = resolver.resolve(&get("/style.css"));
        assert_eq!(css.header("content-type"), Some("text/x-styles"));
        assert_eq!(css.header("cache-control"), Some("public, max-age=60"));

        assert!(!resolver.resolve(&get("/image.png")).binary);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let resolver = Resolver::new("/definitely/not/a/real/root");
        assert_eq!(resolver.resolve(&get("/")).status, StatusCode::NOT_FOUND);
    }
}
