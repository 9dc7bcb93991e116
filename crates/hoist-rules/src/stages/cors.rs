//! CORS (Cross-Origin Resource Sharing).
//!
//! ## Preflight Requests
//!
//! An `OPTIONS` request carrying both `Origin` and
//! `Access-Control-Request-Method` is a preflight. It is answered here with
//! a 204 and never reaches the application. When the origin is allowed the
//! answer carries allow-origin, allow-methods, allow-headers, credentials and
//! max-age; when it is not, the 204 carries no CORS headers at all and the
//! browser blocks the real request.
//!
//! ## Regular Requests
//!
//! Responses to requests from an allowed origin get
//! `Access-Control-Allow-Origin`, credentials and expose-headers, plus
//! `Vary: Origin`.

use http::{Method, StatusCode};
use regex::Regex;

use hoist_config::CorsSettings;
use hoist_core::{Request, Response};

use crate::pipeline::{Flow, RequestStage, ResponseStage};

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "Access-Control-Allow-Credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "Access-Control-Max-Age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";
    /// `Access-Control-Request-Method` header (preflight).
    pub const REQUEST_METHOD: &str = "Access-Control-Request-Method";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "Access-Control-Request-Headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "Origin";
    /// `Vary` header.
    pub const VARY: &str = "Vary";
}

/// The set of allowed origins.
#[derive(Debug, Clone)]
pub enum AllowedOrigins {
    /// Any origin (`*`).
    Any,
    /// Exact origins and wildcard patterns such as `https://*.example.com`.
    List {
        /// Origins compared verbatim.
        exact: Vec<String>,
        /// Compiled wildcard patterns.
        patterns: Vec<Regex>,
    },
}

impl AllowedOrigins {
    /// Builds the set from configured entries.
    pub fn from_list<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut exact = Vec::new();
        let mut patterns = Vec::new();

        for origin in origins {
            let origin = origin.as_ref().trim();
            if origin == "*" {
                return Self::Any;
            }
            if origin.contains('*') {
                let expr = origin
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join("[^/]+");
                match Regex::new(&format!("^(?i){expr}$")) {
                    Ok(re) => patterns.push(re),
                    Err(e) => tracing::warn!(origin, error = %e, "ignoring CORS origin pattern"),
                }
            } else {
                exact.push(origin.to_string());
            }
        }

        Self::List { exact, patterns }
    }

    /// Checks if an origin is allowed.
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List { exact, patterns } => {
                exact.iter().any(|o| o.eq_ignore_ascii_case(origin))
                    || patterns.iter().any(|p| p.is_match(origin))
            }
        }
    }
}

/// CORS stage for both pipeline phases.
#[derive(Debug, Clone)]
pub struct CorsStage {
    allowed_origins: AllowedOrigins,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    expose_headers: Vec<String>,
    allow_credentials: bool,
    max_age: Option<u64>,
}

impl CorsStage {
    /// Builds the stage from configuration.
    pub fn from_config(settings: &CorsSettings) -> Self {
        Self {
            allowed_origins: AllowedOrigins::from_list(&settings.allowed_origins),
            allowed_methods: settings
                .allowed_methods
                .iter()
                .map(|m| m.to_ascii_uppercase())
                .collect(),
            allowed_headers: settings.allowed_headers.clone(),
            expose_headers: settings.exposed_headers.clone(),
            allow_credentials: settings.allow_credentials,
            max_age: settings.max_age.map(|d| d.as_secs()),
        }
    }

    /// Checks if a request is a CORS preflight request.
    pub fn is_preflight(request: &Request) -> bool {
        request.method() == Method::OPTIONS
            && request.headers().contains(headers::ORIGIN)
            && request.headers().contains(headers::REQUEST_METHOD)
    }

    fn allow_origin_value<'a>(&self, origin: &'a str) -> &'a str {
        if matches!(self.allowed_origins, AllowedOrigins::Any) && !self.allow_credentials {
            "*"
        } else {
            origin
        }
    }

    fn preflight_response(&self, request: &Request) -> Response {
        let mut response = Response::new(StatusCode::NO_CONTENT);

        let Some(origin) = request.header(headers::ORIGIN) else {
            return response;
        };
        if !self.allowed_origins.is_allowed(origin) {
            tracing::debug!(origin, "preflight from disallowed origin");
            return response;
        }

        let h = &mut response.headers;
        h.insert(headers::ALLOW_ORIGIN, self.allow_origin_value(origin));
        if !self.allowed_methods.is_empty() {
            h.insert(headers::ALLOW_METHODS, self.allowed_methods.join(", "));
        }
        if !self.allowed_headers.is_empty() {
            h.insert(headers::ALLOW_HEADERS, self.allowed_headers.join(", "));
        } else if let Some(requested) = request.header(headers::REQUEST_HEADERS) {
            h.insert(headers::ALLOW_HEADERS, requested);
        }
        if self.allow_credentials {
            h.insert(headers::ALLOW_CREDENTIALS, "true");
        }
        if let Some(max_age) = self.max_age {
            h.insert(headers::MAX_AGE, max_age.to_string());
        }
        h.append(headers::VARY, "Origin");
        response
    }
}

impl RequestStage for CorsStage {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn on_request(&self, request: Request) -> Flow<Request> {
        if Self::is_preflight(&request) {
            Flow::ShortCircuit(self.preflight_response(&request))
        } else {
            Flow::Continue(request)
        }
    }
}

impl ResponseStage for CorsStage {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn on_response(&self, request: &Request, mut response: Response) -> Flow<Response> {
        let Some(origin) = request.header(headers::ORIGIN) else {
            return Flow::Continue(response);
        };
        if !self.allowed_origins.is_allowed(origin) {
            return Flow::Continue(response);
        }

        let h = &mut response.headers;
        h.insert(headers::ALLOW_ORIGIN, self.allow_origin_value(origin));
        if self.allow_credentials {
            h.insert(headers::ALLOW_CREDENTIALS, "true");
        }
        if !self.expose_headers.is_empty() {
            h.insert(headers::EXPOSE_HEADERS, self.expose_headers.join(", "));
        }
        h.append(headers::VARY, "Origin");
        Flow::Continue(response)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn settings(origins: &[&str]) -> CorsSettings {
        CorsSettings {
            allowed_origins: origins.iter().map(ToString::to_string).collect(),
            max_age: Some(Duration::from_secs(3600)),
            ..CorsSettings::default()
        }
    }

    fn preflight(origin: &str) -> Request {
        Request::builder(Method::OPTIONS, "/api/x")
            .header("Origin", origin)
            .header("Access-Control-Request-Method", "POST")
            .header("Access-Control-Request-Headers", "content-type")
            .build()
    }

    fn short_circuit(stage: &CorsStage, request: Request) -> Response {
        match stage.on_request(request) {
            Flow::ShortCircuit(response) => response,
            Flow::Continue(_) => panic!("expected preflight answer"),
        }
    }

    #[test]
    fn test_allowed_origins() {
        let origins = AllowedOrigins::from_list(["https://a.com", "https://*.example.com"]);
        assert!(origins.is_allowed("https://a.com"));
        assert!(origins.is_allowed("https://app.example.com"));
        assert!(!origins.is_allowed("https://example.com"));
        assert!(!origins.is_allowed("https://evil.com"));
        assert!(!origins.is_allowed("http://app.example.com"));
    }

    #[test]
    fn test_star_means_any() {
        let origins = AllowedOrigins::from_list(["https://a.com", "*"]);
        assert!(matches!(origins, AllowedOrigins::Any));
        assert!(origins.is_allowed("https://anything.dev"));
    }

    #[test]
    fn test_preflight_allowed_origin() {
        let stage = CorsStage::from_config(&settings(&["https://a.com"]));
        let response = short_circuit(&stage, preflight("https://a.com"));

        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(response.header(headers::ALLOW_ORIGIN), Some("https://a.com"));
        assert_eq!(
            response.header(headers::ALLOW_METHODS),
            Some("GET, HEAD, PUT, PATCH, POST, DELETE")
        );
        assert_eq!(response.header(headers::ALLOW_HEADERS), Some("content-type"));
        assert_eq!(response.header(headers::MAX_AGE), Some("3600"));
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_preflight_disallowed_origin_has_no_cors_headers() {
        let stage = CorsStage::from_config(&settings(&["https://a.com"]));
        let response = short_circuit(&stage, preflight("https://evil.com"));

        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.headers.is_empty());
    }

    #[test]
    fn test_plain_options_is_not_preflight() {
        let stage = CorsStage::from_config(&settings(&["*"]));
        let request = Request::builder(Method::OPTIONS, "/").header("Origin", "https://a.com").build();
        assert!(matches!(stage.on_request(request), Flow::Continue(_)));
    }

    #[test]
    fn test_response_headers_for_allowed_origin() {
        let mut cfg = settings(&["https://a.com"]);
        cfg.allow_credentials = true;
        cfg.exposed_headers = vec!["X-Request-Id".to_string()];
        let stage = CorsStage::from_config(&cfg);

        let request = Request::builder(Method::GET, "/").header("Origin", "https://a.com").build();
        let Flow::Continue(response) = stage.on_response(&request, Response::new(StatusCode::OK))
        else {
            panic!()
        };

        assert_eq!(response.header(headers::ALLOW_ORIGIN), Some("https://a.com"));
        assert_eq!(response.header(headers::ALLOW_CREDENTIALS), Some("true"));
        assert_eq!(response.header(headers::EXPOSE_HEADERS), Some("X-Request-Id"));
        assert_eq!(response.header(headers::VARY), Some("Origin"));
    }

    #[test]
    fn test_wildcard_without_credentials_sends_star() {
        let stage = CorsStage::from_config(&settings(&["*"]));
        let request = Request::builder(Method::GET, "/").header("Origin", "https://a.com").build();
        let Flow::Continue(response) = stage.on_response(&request, Response::new(StatusCode::OK))
        else {
            panic!()
        };
        assert_eq!(response.header(headers::ALLOW_ORIGIN), Some("*"));
    }

    #[test]
    fn test_no_origin_leaves_response_alone() {
        let stage = CorsStage::from_config(&settings(&["*"]));
        let request = Request::builder(Method::GET, "/").build();
        let Flow::Continue(response) = stage.on_response(&request, Response::new(StatusCode::OK))
        else {
            panic!()
        };
        assert!(response.headers.is_empty());
    }
}
