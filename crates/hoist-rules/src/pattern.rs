//! Path globs.
//!
//! - `*` matches any run of characters inside one segment (`/assets/*.css`)
//! - `**` as a whole segment matches zero or more segments (`/docs/**`)
//! - `:name` as a whole segment matches one non-empty segment and captures it
//!
//! The text matched by `**` (or, without one, by the last `*`) is available
//! to redirect templates as `:splat`.

use std::fmt;

use regex::Regex;

use crate::error::RuleError;

/// A compiled path glob.
///
/// # Example
///
/// ```
/// use hoist_rules::PathPattern;
///
/// let pattern = PathPattern::parse("/users/:id/**").unwrap();
/// let captures = pattern.captures("/users/42/posts/7").unwrap();
///
/// assert_eq!(captures.get("id"), Some("42"));
/// assert_eq!(captures.splat(), "posts/7");
/// assert_eq!(captures.expand("/u/:id?tail=:splat"), "/u/42?tail=posts/7");
/// ```
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
    splat_group: Option<String>,
}

impl PathPattern {
    /// Compiles a glob.
    pub fn parse(pattern: &str) -> Result<Self, RuleError> {
        if pattern.is_empty() {
            return Err(RuleError::pattern(pattern, "pattern is empty"));
        }
        if !pattern.starts_with('/') {
            return Err(RuleError::pattern(pattern, "pattern must start with '/'"));
        }
        check_balanced(pattern)?;

        let mut expr = String::from("^");
        let mut params = Vec::new();
        let mut wildcards = Vec::new();
        let mut globstar = None;

        for segment in pattern[1..].split('/') {
            if segment == "**" {
                let group = format!("_w{}", wildcards.len());
                expr.push_str(&format!("(?:/(?P<{group}>.*))?"));
                wildcards.push(group.clone());
                globstar = Some(group);
                continue;
            }

            expr.push('/');
            if let Some(name) = segment.strip_prefix(':') {
                if !is_identifier(name) {
                    return Err(RuleError::pattern(
                        pattern,
                        format!("invalid parameter name {name:?}"),
                    ));
                }
                if params.iter().any(|p| p == name) {
                    return Err(RuleError::pattern(
                        pattern,
                        format!("duplicate parameter {name:?}"),
                    ));
                }
                expr.push_str(&format!("(?P<{name}>[^/]+)"));
                params.push(name.to_string());
                continue;
            }

            if segment.contains("**") {
                return Err(RuleError::pattern(
                    pattern,
                    "'**' must be a whole path segment",
                ));
            }
            for c in segment.chars() {
                if c == '*' {
                    let group = format!("_w{}", wildcards.len());
                    expr.push_str(&format!("(?P<{group}>[^/]*)"));
                    wildcards.push(group);
                } else {
                    expr.push_str(&regex::escape(c.encode_utf8(&mut [0; 4])));
                }
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| RuleError::pattern(pattern, e.to_string()))?;
        let splat_group = globstar.or_else(|| wildcards.last().cloned());

        Ok(Self {
            source: pattern.to_string(),
            regex,
            params,
            splat_group,
        })
    }

    /// The glob as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns `true` if `path` matches.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Matches `path` and returns its captures.
    pub fn captures(&self, path: &str) -> Option<Captures> {
        let caps = self.regex.captures(path)?;
        let params = self
            .params
            .iter()
            .map(|name| {
                let value = caps.name(name).map_or("", |m| m.as_str());
                (name.clone(), value.to_string())
            })
            .collect();
        let splat = self
            .splat_group
            .as_deref()
            .and_then(|group| caps.name(group))
            .map_or_else(String::new, |m| m.as_str().to_string());

        Some(Captures { params, splat })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Values captured by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    params: Vec<(String, String)>,
    splat: String,
}

impl Captures {
    /// Value of the `:name` segment.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text matched by the splat wildcard, empty if there was none.
    pub fn splat(&self) -> &str {
        &self.splat
    }

    /// Replaces `:name` and `:splat` references in `template`.
    ///
    /// Unknown names are left as written, so `https://host:8080` survives.
    pub fn expand(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(pos) = rest.find(':') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let len = identifier_len(after);
            let name = &after[..len];

            let value = if len == 0 {
                None
            } else if name == "splat" {
                Some(self.splat())
            } else {
                self.get(name)
            };

            match value {
                Some(value) => out.push_str(value),
                None => {
                    out.push(':');
                    out.push_str(name);
                }
            }
            rest = &after[len..];
        }
        out.push_str(rest);
        out
    }
}

fn identifier_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(s.len(), |(i, _)| i)
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && identifier_len(s) == s.len() && !s.starts_with("_w")
}

fn check_balanced(pattern: &str) -> Result<(), RuleError> {
    let mut open = Vec::new();
    for c in pattern.chars() {
        match c {
            '(' | '[' | '{' => open.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if open.pop() != Some(expected) {
                    return Err(RuleError::pattern(pattern, format!("unbalanced {c:?}")));
                }
            }
            _ => {}
        }
    }
    match open.last() {
        Some(c) => Err(RuleError::pattern(pattern, format!("unclosed {c:?}"))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> bool {
        PathPattern::parse(pattern).unwrap().is_match(path)
    }

    #[test]
    fn test_literal() {
        assert!(matches("/", "/"));
        assert!(matches("/about", "/about"));
        assert!(!matches("/about", "/about/team"));
        assert!(!matches("/a.b", "/axb"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        assert!(matches("/api/*", "/api/users"));
        assert!(!matches("/api/*", "/api/users/1"));
        assert!(!matches("/api/*", "/static/app.js"));
        assert!(matches("/assets/*.css", "/assets/site.css"));
        assert!(!matches("/assets/*.css", "/assets/site.js"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        assert!(matches("/**", "/"));
        assert!(matches("/**", "/a/b/c"));
        assert!(matches("/docs/**", "/docs"));
        assert!(matches("/docs/**", "/docs/guide/intro"));
        assert!(!matches("/docs/**", "/documents"));
        assert!(matches("/a/**/z", "/a/z"));
        assert!(matches("/a/**/z", "/a/b/c/z"));
    }

    #[test]
    fn test_named_params() {
        let pattern = PathPattern::parse("/blog/:year/:slug").unwrap();
        let caps = pattern.captures("/blog/2024/hello").unwrap();
        assert_eq!(caps.get("year"), Some("2024"));
        assert_eq!(caps.get("slug"), Some("hello"));
        assert!(pattern.captures("/blog/2024").is_none());
    }

    #[test]
    fn test_splat_from_single_star() {
        let pattern = PathPattern::parse("/old/*").unwrap();
        let caps = pattern.captures("/old/page").unwrap();
        assert_eq!(caps.splat(), "page");
    }

    #[test]
    fn test_expand_leaves_unknown_names() {
        let caps = PathPattern::parse("/:id").unwrap().captures("/7").unwrap();
        assert_eq!(
            caps.expand("https://example.com:8080/items/:id/:other"),
            "https://example.com:8080/items/7/:other"
        );
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathPattern::parse("").is_err());
        assert!(PathPattern::parse("api/*").is_err());
        assert!(PathPattern::parse("/a/{b").is_err());
        assert!(PathPattern::parse("/a)").is_err());
        assert!(PathPattern::parse("/a**").is_err());
        assert!(PathPattern::parse("/:").is_err());
        assert!(PathPattern::parse("/:id/:id").is_err());
    }

    #[test]
    fn test_balanced_brackets_are_literal() {
        assert!(matches("/files/(draft)", "/files/(draft)"));
    }
}
