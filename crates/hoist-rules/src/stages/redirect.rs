//! Redirect rules.
//!
//! The first rule (in declared order) whose pattern matches the request path
//! replaces the response with an empty-bodied redirect. Captured `:name`
//! segments and `:splat` are substituted into the location, and the request
//! query string is carried over.

use http::StatusCode;

use hoist_config::RedirectRuleConfig;
use hoist_core::{Request, Response};

use crate::error::RuleError;
use crate::pattern::PathPattern;
use crate::pipeline::{Flow, ResponseStage};

#[derive(Debug, Clone)]
struct RedirectRule {
    pattern: PathPattern,
    location: String,
    status: StatusCode,
}

/// Ordered redirect rules.
#[derive(Debug, Clone, Default)]
pub struct RedirectRules {
    rules: Vec<RedirectRule>,
}

impl RedirectRules {
    /// Compiles the declared rules.
    pub fn from_config(rules: &[RedirectRuleConfig]) -> Result<Self, RuleError> {
        let rules = rules
            .iter()
            .map(|rule| -> Result<RedirectRule, RuleError> {
                let status = StatusCode::from_u16(rule.status)
                    .ok()
                    .filter(StatusCode::is_redirection)
                    .ok_or(RuleError::InvalidStatus {
                        status: rule.status,
                    })?;
                Ok(RedirectRule {
                    pattern: PathPattern::parse(&rule.pattern)?,
                    location: rule.location.clone(),
                    status,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    /// Status and destination for `request`, if any rule matches.
    pub fn resolve(&self, request: &Request) -> Option<(StatusCode, String)> {
        self.rules.iter().find_map(|rule| {
            let captures = rule.pattern.captures(request.path())?;
            let mut location = captures.expand(&rule.location);
            if !request.query().is_empty() {
                location.push(if location.contains('?') { '&' } else { '?' });
                location.push_str(&request.query().to_query_string());
            }
            Some((rule.status, location))
        })
    }
}

impl ResponseStage for RedirectRules {
    fn name(&self) -> &'static str {
        "redirect"
    }

    fn on_response(&self, request: &Request, response: Response) -> Flow<Response> {
        match self.resolve(request) {
            Some((status, location)) => {
                tracing::debug!(
                    path = request.path(),
                    location = %location,
                    status = status.as_u16(),
                    "redirect rule matched"
                );
                Flow::ShortCircuit(
                    Response::new(status)
                        .with_header("Location", location)
                        .with_header("Content-Length", "0"),
                )
            }
            None => Flow::Continue(response),
        }
    }
}
