//! `nodes_dn` / `admin_dn` patterns
//!
//! A pattern is either `/regex/` or a literal DN with `*` and `?` wildcards.

use regex::Regex;

use crate::errors::{Result, ToolError};

#[derive(Debug, Clone)]
pub struct DnPattern {
    source: String,
    matcher: Regex,
}

impl DnPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        let expression = match trimmed
            .strip_prefix('/')
            .and_then(|inner| inner.strip_suffix('/'))
        {
            Some(inner) if !inner.is_empty() => format!("^(?:{inner})$"),
            _ => wildcard_expression(trimmed),
        };
        let matcher = Regex::new(&expression).map_err(|e| {
            ToolError::configuration(format!("invalid DN pattern {pattern:?}: {e}"))
        })?;
        Ok(Self {
            source: trimmed.to_string(),
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, dn: &str) -> bool {
        self.matcher.is_match(dn)
    }
}

fn wildcard_expression(pattern: &str) -> String {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            _ => expression.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    expression.push('$');
    expression
}

pub fn parse_all(patterns: &[String]) -> Result<Vec<DnPattern>> {
    patterns.iter().map(|pattern| DnPattern::parse(pattern)).collect()
}

pub fn any_matches(patterns: &[DnPattern], dn: &str) -> bool {
    patterns.iter().any(|pattern| pattern.matches(dn))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_match_whole_dn() {
        let pattern = DnPattern::parse("CN=node?.example.com,OU=*").unwrap();
        assert!(pattern.matches("CN=node1.example.com,OU=Ops"));
        assert!(!pattern.matches("CN=node10.example.com,OU=Ops"));
        assert!(!pattern.matches("XCN=node1.example.com,OU=Ops"));
    }

    #[test]
    fn literal_characters_are_escaped() {
        let pattern = DnPattern::parse("CN=a.b,O=Example Com\\, Inc.").unwrap();
        assert!(pattern.matches("CN=a.b,O=Example Com\\, Inc."));
        assert!(!pattern.matches("CN=aXb,O=Example Com\\, Inc."));
    }

    #[test]
    fn regex_patterns() {
        let pattern = DnPattern::parse("/CN=node[0-9]+\\.example\\.com/").unwrap();
        assert!(pattern.matches("CN=node42.example.com"));
        assert!(!pattern.matches("CN=nodeX.example.com"));
        assert_eq!(pattern.as_str(), "/CN=node[0-9]+\\.example\\.com/");
    }

    #[test]
    fn invalid_regex_is_a_configuration_error() {
        let err = DnPattern::parse("/CN=node[0-9/").unwrap_err();
        assert!(matches!(err, ToolError::Configuration(_)));
    }

    #[test]
    fn any_of_several_patterns() {
        let patterns = parse_all(&["CN=a".to_string(), "CN=b*".to_string()]).unwrap();
        assert!(any_matches(&patterns, "CN=bee"));
        assert!(!any_matches(&patterns, "CN=c"));
    }
}
