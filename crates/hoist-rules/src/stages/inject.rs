//! Content injection into HTML responses.

use std::str::FromStr;

use bytes::Bytes;

use hoist_config::InjectRuleConfig;
use hoist_core::{Request, Response};

use crate::error::RuleError;
use crate::pattern::PathPattern;
use crate::pipeline::{Flow, ResponseStage};

/// Where a snippet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectPosition {
    /// Immediately before `</head>`.
    Head,
    /// Immediately after the `<body ...>` open tag.
    BodyStart,
    /// Immediately before the last `</body>`.
    BodyEnd,
}

impl FromStr for InjectPosition {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "head" => Ok(Self::Head),
            "body-start" => Ok(Self::BodyStart),
            "body-end" => Ok(Self::BodyEnd),
            other => Err(RuleError::InvalidPosition {
                position: other.to_string(),
            }),
        }
    }
}

impl InjectPosition {
    /// Byte offset to insert at, or `None` when the anchor is missing.
    ///
    /// `lower` must be the ASCII-lowercased document.
    fn offset(self, lower: &[u8]) -> Option<usize> {
        match self {
            Self::Head => find(lower, b"</head>"),
            Self::BodyEnd => rfind(lower, b"</body>"),
            Self::BodyStart => {
                let mut from = 0;
                while let Some(pos) = find(&lower[from..], b"<body") {
                    let tag = from + pos;
                    let next = lower.get(tag + 5).copied();
                    if matches!(next, Some(b'>' | b' ' | b'\t' | b'\n' | b'\r' | b'/')) {
                        return find(&lower[tag..], b">").map(|end| tag + end + 1);
                    }
                    from = tag + 5;
                }
                None
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

/// Inserts `snippet` at `position`, returning `None` if the anchor is absent.
pub fn inject(html: &[u8], position: InjectPosition, snippet: &str) -> Option<Vec<u8>> {
    let lower = html.to_ascii_lowercase();
    let at = position.offset(&lower)?;

    let mut out = Vec::with_capacity(html.len() + snippet.len());
    out.extend_from_slice(&html[..at]);
    out.extend_from_slice(snippet.as_bytes());
    out.extend_from_slice(&html[at..]);
    Some(out)
}

#[derive(Debug, Clone)]
struct InjectRule {
    pattern: PathPattern,
    position: InjectPosition,
    content: String,
}

/// Ordered inject rules.
#[derive(Debug, Clone, Default)]
pub struct InjectRules {
    rules: Vec<InjectRule>,
}

impl InjectRules {
    /// Compiles the declared rules. `file` references must already be
    /// resolved by the configuration loader.
    pub fn from_config(rules: &[InjectRuleConfig]) -> Result<Self, RuleError> {
        let rules = rules
            .iter()
            .map(|rule| -> Result<InjectRule, RuleError> {
                Ok(InjectRule {
                    pattern: PathPattern::parse(&rule.pattern)?,
                    position: rule.position.parse()?,
                    content: rule.content().to_string(),
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }
}

impl ResponseStage for InjectRules {
    fn name(&self) -> &'static str {
        "inject"
    }

    fn on_response(&self, request: &Request, mut response: Response) -> Flow<Response> {
        if self.rules.is_empty()
            || response.media_type().as_deref() != Some("text/html")
            || response.headers.contains("content-encoding")
        {
            return Flow::Continue(response);
        }

        let mut body: Option<Vec<u8>> = None;
        for rule in self.rules.iter().filter(|r| r.pattern.is_match(request.path())) {
            let current = body.as_deref().unwrap_or(&response.body[..]);
            if let Some(next) = inject(current, rule.position, &rule.content) {
                body = Some(next);
            }
        }

        if let Some(body) = body {
            response.set_body(Bytes::from(body));
        }
        Flow::Continue(response)
    }
}
