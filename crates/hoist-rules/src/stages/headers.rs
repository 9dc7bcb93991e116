//! Header rules.
//!
//! Every rule whose pattern matches the request path applies, in declared
//! order. Adding a header that already exists appends another value. Within
//! one rule, removals run before additions, so a rule can replace a header
//! by removing and re-adding it.

use http::{HeaderName, HeaderValue};
use indexmap::IndexMap;

use hoist_config::HeaderRuleConfig;
use hoist_core::{Request, Response};

use crate::error::RuleError;
use crate::pattern::PathPattern;
use crate::pipeline::{Flow, RequestStage, ResponseStage};

#[derive(Debug, Clone)]
struct HeaderRule {
    pattern: PathPattern,
    request: Vec<(String, String)>,
    response: Vec<(String, String)>,
    remove: Vec<String>,
}

/// Request- and response-phase header rules.
#[derive(Debug, Clone, Default)]
pub struct HeaderRules {
    rules: Vec<HeaderRule>,
}

impl HeaderRules {
    /// Compiles the declared rules.
    pub fn from_config(rules: &[HeaderRuleConfig]) -> Result<Self, RuleError> {
        let rules = rules
            .iter()
            .map(|rule| -> Result<HeaderRule, RuleError> {
                Ok(HeaderRule {
                    pattern: PathPattern::parse(&rule.pattern)?,
                    request: checked_pairs(&rule.request)?,
                    response: checked_pairs(&rule.response)?,
                    remove: rule
                        .remove
                        .iter()
                        .map(|name| checked_name(name).map(|()| name.clone()))
                        .collect::<Result<_, _>>()?,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rules })
    }

    /// Number of compiled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn matching<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a HeaderRule> + 'a {
        self.rules.iter().filter(move |r| r.pattern.is_match(path))
    }
}

fn checked_name(name: &str) -> Result<(), RuleError> {
    HeaderName::from_bytes(name.as_bytes())
        .map(|_| ())
        .map_err(|_| RuleError::InvalidHeaderName {
            name: name.to_string(),
        })
}

fn checked_pairs(map: &IndexMap<String, String>) -> Result<Vec<(String, String)>, RuleError> {
    map.iter()
        .map(|(name, value)| {
            checked_name(name)?;
            HeaderValue::from_str(value).map_err(|_| RuleError::InvalidHeaderValue {
                name: name.clone(),
            })?;
            Ok((name.clone(), value.clone()))
        })
        .collect()
}

impl RequestStage for HeaderRules {
    fn name(&self) -> &'static str {
        "headers"
    }

    fn on_request(&self, request: Request) -> Flow<Request> {
        let additions: Vec<&(String, String)> = self
            .matching(request.path())
            .flat_map(|rule| rule.request.iter())
            .collect();
        if additions.is_empty() {
            return Flow::Continue(request);
        }

        let mut headers = request.headers().clone();
        for (name, value) in additions {
            headers.append(name.as_str(), value.as_str());
        }
        Flow::Continue(request.with_headers(headers))
    }
}

impl ResponseStage for HeaderRules {
    fn name(&self) -> &'static str {
        "headers"
    }

    fn on_response(&self, request: &Request, mut response: Response) -> Flow<Response> {
        for rule in self.matching(request.path()) {
            for name in &rule.remove {
                response.headers.remove(name);
            }
            for (name, value) in &rule.response {
                response.headers.append(name.as_str(), value.as_str());
            }
        }
        Flow::Continue(response)
    }
}
