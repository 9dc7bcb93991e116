//! Canonical HTTP message types.
//!
//! The relay never works on the invocation event or on a transport-specific
//! request type directly. Everything in between the adapter's decode and
//! encode steps sees a [`Request`] and produces a [`Response`].
//!
//! Header and query multimaps are plain ordered lists of pairs. Insertion
//! order is preserved, duplicate keys are legal, and nothing is collapsed.

use bytes::Bytes;
use http::{Method, StatusCode};

use crate::context::{RequestId, SourceContext};

/// Returns the lowercased media type of a `Content-Type` value, without
/// parameters.
///
/// # Example
///
/// ```
/// use hoist_core::base_content_type;
///
/// assert_eq!(base_content_type("Text/HTML; charset=utf-8"), "text/html");
/// ```
#[must_use]
pub fn base_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_ascii_lowercase()
}

/// Ordered header multimap with case-insensitive names.
///
/// Names keep the casing they were added with; lookups ignore case.
///
/// # Example
///
/// ```
/// use hoist_core::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("Set-Cookie", "a=1");
/// headers.append("set-cookie", "b=2");
///
/// assert_eq!(headers.get_all("SET-COOKIE"), vec!["a=1", "b=2"]);
/// assert_eq!(headers.get_last("set-cookie"), Some("b=2"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces every value for `name` with a single value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// Removes every value for `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before - self.entries.len()
    }

    /// Returns the first value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the last value for `name`.
    #[must_use]
    pub fn get_last(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `name` in insertion order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Returns `true` if at least one value exists for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Returns the distinct header names in order of first appearance.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in &self.entries {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name);
            }
        }
        names
    }

    /// Iterates over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the number of `(name, value)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Ordered query parameter multimap. Keys are case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, String)>,
}

impl QueryParams {
    /// Creates an empty parameter list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Returns the first value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `key` in order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Iterates over all `(key, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encodes the parameters as an `application/x-www-form-urlencoded`
    /// query string, without the leading `?`.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Canonical request.
///
/// Built once by the invocation adapter and never mutated afterwards. Stages
/// that need a different request (request-header rules) build a new value
/// with [`Request::with_headers`].
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: QueryParams,
    headers: Headers,
    body: Option<Bytes>,
    source: SourceContext,
}

impl Request {
    /// Starts building a request.
    #[must_use]
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, path)
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// URL path, always starting with `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters.
    #[must_use]
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Shorthand for `headers().get(name)`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Request body, if the event carried one.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Invocation source metadata.
    #[must_use]
    pub fn source(&self) -> &SourceContext {
        &self.source
    }

    /// Correlation id of the invocation.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.source.request_id
    }

    /// Path plus encoded query string, e.g. `/search?q=rust`.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query.to_query_string())
        }
    }

    /// Returns a copy of this request with a different header set.
    #[must_use]
    pub fn with_headers(self, headers: Headers) -> Self {
        Self { headers, ..self }
    }
}

/// Builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    /// Creates a builder for `method` and `path`.
    ///
    /// An empty path is normalised to `/`.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            request: Request {
                method,
                path,
                query: QueryParams::new(),
                headers: Headers::new(),
                body: None,
                source: SourceContext::new(),
            },
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.append(name, value);
        self
    }

    /// Replaces the header set.
    #[must_use]
    pub fn headers(mut self, headers: Headers) -> Self {
        self.request.headers = headers;
        self
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query.append(key, value);
        self
    }

    /// Replaces the query parameters.
    #[must_use]
    pub fn query_params(mut self, query: QueryParams) -> Self {
        self.request.query = query;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = Some(body.into());
        self
    }

    /// Sets the source metadata.
    #[must_use]
    pub fn source(mut self, source: SourceContext) -> Self {
        self.request.source = source;
        self
    }

    /// Finishes the request.
    #[must_use]
    pub fn build(self) -> Request {
        self.request
    }
}

/// Canonical response.
///
/// Fields are public: pipeline stages take a response by value, adjust it,
/// and hand it on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: Headers,
    /// Fully materialised body.
    pub body: Bytes,
    /// Whether the body must be treated as opaque bytes when encoded.
    pub binary: bool,
}

impl Response {
    /// Creates an empty response with `status`.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            binary: false,
        }
    }

    /// Creates a `text/html` response.
    #[must_use]
    pub fn html(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body(body)
    }

    /// Creates an `application/json` response from a serializable value.
    #[must_use]
    pub fn json<T: serde::Serialize>(status: StatusCode, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
        Self::new(status)
            .with_header("Content-Type", "application/json")
            .with_body(body)
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the binary flag.
    #[must_use]
    pub fn with_binary(mut self, binary: bool) -> Self {
        self.binary = binary;
        self
    }

    /// Shorthand for `headers.get(name)`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The lowercased media type of the `Content-Type` header, if any.
    #[must_use]
    pub fn media_type(&self) -> Option<String> {
        self.headers.get("content-type").map(base_content_type)
    }

    /// Replaces the body, keeping an existing `Content-Length` accurate.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        if self.headers.contains("content-length") {
            self.headers
                .insert("Content-Length", self.body.len().to_string());
        }
    }

    /// Returns `true` for 4xx and 5xx statuses.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status.is_client_error() || self.status.is_server_error()
    }
}
