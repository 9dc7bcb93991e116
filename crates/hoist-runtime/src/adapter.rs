//! Translation between invocation events and the canonical HTTP types.
//!
//! The inbound event is the API Gateway proxy shape:
//!
//! ```json
//! {
//!   "httpMethod": "GET",
//!   "path": "/api/users",
//!   "headers": {"Accept": "application/json"},
//!   "multiValueHeaders": {"Accept": ["application/json"]},
//!   "queryStringParameters": {"page": "2"},
//!   "multiValueQueryStringParameters": {"page": ["2"]},
//!   "body": null,
//!   "isBase64Encoded": false,
//!   "requestContext": {"stage": "production", "requestId": "…",
//!                      "identity": {"sourceIp": "203.0.113.9"}}
//! }
//! ```
//!
//! Multi-value maps win over their single-value counterparts for the same
//! key. Every map keeps the order it had in the JSON document.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use http::Method;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use hoist_core::{
    Headers, HoistError, QueryParams, Request, RequestId, Response, SourceContext,
};
use hoist_static::TextTypes;

/// Inbound invocation event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEvent {
    /// HTTP method.
    pub http_method: Option<String>,
    /// Request path.
    pub path: Option<String>,
    /// Last value per header.
    pub headers: Option<IndexMap<String, String>>,
    /// Every value per header.
    pub multi_value_headers: Option<IndexMap<String, Vec<String>>>,
    /// Last value per query parameter.
    pub query_string_parameters: Option<IndexMap<String, String>>,
    /// Every value per query parameter.
    pub multi_value_query_string_parameters: Option<IndexMap<String, Vec<String>>>,
    /// Body text, base64 when `is_base64_encoded`.
    pub body: Option<String>,
    /// Whether `body` is base64.
    #[serde(default)]
    pub is_base64_encoded: bool,
    /// Platform metadata.
    pub request_context: Option<RequestContext>,
}

/// `requestContext` of an invocation event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Deployment stage.
    pub stage: Option<String>,
    /// Platform request id.
    pub request_id: Option<String>,
    /// Caller identity.
    pub identity: Option<Identity>,
}

/// `requestContext.identity` of an invocation event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Client address.
    pub source_ip: Option<String>,
}

/// Outbound invocation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    /// HTTP status.
    pub status_code: u16,
    /// Last value per header.
    pub headers: IndexMap<String, String>,
    /// Every value per header, in order.
    pub multi_value_headers: IndexMap<String, Vec<String>>,
    /// Body text, base64 when `is_base64_encoded`.
    pub body: String,
    /// Whether `body` is base64.
    pub is_base64_encoded: bool,
}

/// Decodes an invocation event into a [`Request`].
///
/// # Example
///
/// ```
/// use hoist_runtime::adapter;
///
/// let request = adapter::decode(br#"{"httpMethod": "GET", "path": "/hello"}"#).unwrap();
/// assert_eq!(request.path(), "/hello");
///
/// assert!(adapter::decode(br#"{"path": "/hello"}"#).is_err());
/// ```
pub fn decode(event: &[u8]) -> Result<Request, HoistError> {
    let event: InvocationEvent = serde_json::from_slice(event)
        .map_err(|e| HoistError::decode(format!("invalid JSON: {e}")))?;

    let method = event
        .http_method
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| HoistError::decode("missing httpMethod"))?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| HoistError::decode(format!("invalid httpMethod {method:?}")))?;

    let path = event
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| HoistError::decode("missing path"))?;

    let mut headers = Headers::new();
    for (name, values) in merge(event.headers, event.multi_value_headers, true) {
        for value in values {
            headers.append(name.clone(), value);
        }
    }

    let mut query = QueryParams::new();
    for (key, values) in merge(
        event.query_string_parameters,
        event.multi_value_query_string_parameters,
        false,
    ) {
        for value in values {
            query.append(key.clone(), value);
        }
    }

    let context = event.request_context.unwrap_or_default();
    let source = SourceContext {
        stage: context.stage,
        request_id: context
            .request_id
            .filter(|id| !id.is_empty())
            .map_or_else(RequestId::generate, RequestId::from),
        client_ip: context.identity.and_then(|i| i.source_ip),
    };

    let mut builder = Request::builder(method, path)
        .headers(headers)
        .query_params(query)
        .source(source);

    if let Some(body) = event.body {
        if event.is_base64_encoded {
            let bytes = BASE64_STANDARD
                .decode(body.trim())
                .map_err(|e| HoistError::decode(format!("invalid base64 body: {e}")))?;
            builder = builder.body(bytes);
        } else {
            builder = builder.body(body);
        }
    }

    Ok(builder.build())
}

/// Encodes a [`Response`] as an invocation result.
///
/// The singular header map holds the last value per name; the multi-value
/// map holds them all. Names keep the casing of their first occurrence.
pub fn encode(response: &Response) -> Vec<u8> {
    let result = to_invocation_response(response);
    match serde_json::to_vec(&result) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize invocation response");
            br#"{"statusCode":500,"headers":{},"multiValueHeaders":{},"body":"","isBase64Encoded":false}"#
                .to_vec()
        }
    }
}

/// Builds the outbound event structure for `response`.
pub fn to_invocation_response(response: &Response) -> InvocationResponse {
    let mut multi_value_headers: IndexMap<String, Vec<String>> = IndexMap::new();
    for (name, value) in response.headers.iter() {
        match multi_value_headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, values)) => values.push(value.to_string()),
            None => {
                multi_value_headers.insert(name.to_string(), vec![value.to_string()]);
            }
        }
    }

    let headers = multi_value_headers
        .iter()
        .filter_map(|(name, values)| values.last().map(|v| (name.clone(), v.clone())))
        .collect();

    // Text that is not valid UTF-8 still has to arrive byte for byte.
    let (body, is_base64_encoded) = match std::str::from_utf8(&response.body) {
        Ok(text) if !response.binary => (text.to_string(), false),
        _ => (BASE64_STANDARD.encode(&response.body), true),
    };

    InvocationResponse {
        status_code: response.status.as_u16(),
        headers,
        multi_value_headers,
        body,
        is_base64_encoded,
    }
}

/// Whether a relayed response body must travel base64-encoded.
///
/// Encoded bodies are always binary, as are bodies that are not valid
/// UTF-8. Otherwise the content type decides; a response without one is
/// text.
pub fn is_binary(response: &Response, text_types: &TextTypes) -> bool {
    if response
        .header("content-encoding")
        .is_some_and(|e| !e.trim().eq_ignore_ascii_case("identity"))
    {
        return true;
    }
    if std::str::from_utf8(&response.body).is_err() {
        return true;
    }
    response
        .header("content-type")
        .is_some_and(|t| !text_types.is_text(t))
}

/// Merges a single-value map with its multi-value counterpart.
///
/// Multi-value entries come first and win for names present in both.
fn merge(
    single: Option<IndexMap<String, String>>,
    multi: Option<IndexMap<String, Vec<String>>>,
    case_insensitive: bool,
) -> IndexMap<String, Vec<String>> {
    let same = |a: &str, b: &str| {
        if case_insensitive {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    };

    let mut merged = multi.unwrap_or_default();
    for (key, value) in single.unwrap_or_default() {
        if !merged.keys().any(|existing| same(existing, &key)) {
            merged.insert(key, vec![value]);
        }
    }
    merged
}
