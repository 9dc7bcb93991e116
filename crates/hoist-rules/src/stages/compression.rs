//! Response compression.
//!
//! Compresses response bodies with gzip or brotli based on the client's
//! `Accept-Encoding` header.
//!
//! A response is compressed only when all of these hold:
//!
//! - its base content type is in the compressible list
//! - `Accept-Encoding` names a supported scheme with a non-zero q-value
//! - the body is at least `min_size` bytes
//! - it has no `Content-Encoding` yet and is not flagged binary
//!
//! Compressed output that is not smaller than the input is thrown away.
//! Compressed bodies are always flagged binary.

use std::collections::HashSet;
use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;

use hoist_config::CompressionSettings;
use hoist_core::{base_content_type, Request, Response};

use crate::error::RuleError;
use crate::pipeline::{Flow, ResponseStage};

/// Compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Gzip compression (RFC 1952).
    Gzip,
    /// Brotli compression (RFC 7932).
    Brotli,
}

impl Algorithm {
    /// Returns the HTTP content-encoding value for this algorithm.
    pub fn encoding_name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Brotli => "br",
        }
    }

    /// Parses an algorithm from its HTTP encoding name.
    pub fn from_encoding(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "br" | "brotli" => Some(Self::Brotli),
            _ => None,
        }
    }

    fn compress(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GzCompression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::Brotli => {
                let mut output = Vec::new();
                let params = brotli::enc::BrotliEncoderParams {
                    quality: 6,
                    ..Default::default()
                };
                brotli::BrotliCompress(&mut std::io::Cursor::new(data), &mut output, &params)?;
                Ok(output)
            }
        }
    }
}

/// Content types compressed when the configuration lists none.
pub const DEFAULT_COMPRESSIBLE_TYPES: &[&str] = &[
    "text/plain",
    "text/html",
    "text/css",
    "text/javascript",
    "text/xml",
    "text/csv",
    "text/markdown",
    "application/json",
    "application/javascript",
    "application/xml",
    "application/xhtml+xml",
    "application/rss+xml",
    "application/atom+xml",
    "application/ld+json",
    "application/manifest+json",
    "application/graphql",
    "image/svg+xml",
    "image/x-icon",
    "font/ttf",
    "font/otf",
];

/// Compression stage.
#[derive(Debug, Clone)]
pub struct CompressionStage {
    algorithms: Vec<Algorithm>,
    min_size: usize,
    content_types: HashSet<String>,
}

impl CompressionStage {
    /// Builds the stage from configuration.
    pub fn from_config(settings: &CompressionSettings) -> Result<Self, RuleError> {
        let algorithms = settings
            .algorithms
            .iter()
            .map(|name| {
                Algorithm::from_encoding(name)
                    .ok_or_else(|| RuleError::UnsupportedAlgorithm { name: name.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let content_types = if settings.types.is_empty() {
            DEFAULT_COMPRESSIBLE_TYPES
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        } else {
            settings
                .types
                .iter()
                .map(|t| base_content_type(t))
                .collect()
        };

        Ok(Self {
            algorithms,
            min_size: settings.min_size,
            content_types,
        })
    }

    /// Parses the Accept-Encoding header into `(coding, quality)` pairs,
    /// highest quality first. Ties keep the client's order.
    fn parse_accept_encoding(header_value: &str) -> Vec<(String, f32)> {
        let mut encodings: Vec<(String, f32)> = header_value
            .split(',')
            .filter_map(|part| {
                let mut pieces = part.split(';');
                let coding = pieces.next()?.trim().to_ascii_lowercase();
                if coding.is_empty() {
                    return None;
                }
                let quality = pieces
                    .filter_map(|p| p.trim().strip_prefix("q="))
                    .find_map(|q| q.trim().parse::<f32>().ok())
                    .map_or(1.0, |q| q.clamp(0.0, 1.0));
                Some((coding, quality))
            })
            .collect();

        encodings.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        encodings
    }

    /// Picks the algorithm to use for `accept_encoding`, if any.
    pub fn select_algorithm(&self, accept_encoding: &str) -> Option<Algorithm> {
        let prefs = Self::parse_accept_encoding(accept_encoding);
        let refused = |alg: Algorithm| {
            prefs
                .iter()
                .any(|(c, q)| *q <= 0.0 && Algorithm::from_encoding(c) == Some(alg))
        };

        for (coding, quality) in &prefs {
            if *quality <= 0.0 {
                continue;
            }
            if coding == "*" {
                return self.algorithms.iter().copied().find(|a| !refused(*a));
            }
            if let Some(alg) = Algorithm::from_encoding(coding) {
                if self.algorithms.contains(&alg) {
                    return Some(alg);
                }
            }
        }
        None
    }

    fn is_compressible(&self, response: &Response) -> bool {
        response
            .media_type()
            .is_some_and(|t| self.content_types.contains(&t))
    }
}

impl ResponseStage for CompressionStage {
    fn name(&self) -> &'static str {
        "compression"
    }

    fn on_response(&self, request: &Request, mut response: Response) -> Flow<Response> {
        if response.binary
            || response.headers.contains("content-encoding")
            || response.body.len() < self.min_size
            || !self.is_compressible(&response)
        {
            return Flow::Continue(response);
        }

        let Some(algorithm) = request
            .header("accept-encoding")
            .and_then(|ae| self.select_algorithm(ae))
        else {
            return Flow::Continue(response);
        };

        let compressed = match algorithm.compress(&response.body) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, encoding = algorithm.encoding_name(), "compression failed");
                return Flow::Continue(response);
            }
        };
        if compressed.len() >= response.body.len() {
            return Flow::Continue(response);
        }

        tracing::trace!(
            encoding = algorithm.encoding_name(),
            from = response.body.len(),
            to = compressed.len(),
            "compressed response"
        );
        response.set_body(Bytes::from(compressed));
        response
            .headers
            .insert("Content-Encoding", algorithm.encoding_name());
        response.headers.append("Vary", "Accept-Encoding");
        response.binary = true;
        Flow::Continue(response)
    }
}
