//! Minimal ModSecurity/Coraza-style rule matcher.
//!
//! Real Coraza rules are a small DSL; this compiles only the `@rx "<regex>"`
//! operator out of a ruleset's raw text into a `regex::RegexSet`; matching
//! is a single set-membership test against the combined request surface
//! (spec.md §4.2 step 1). Grounded on the reference crate's
//! `rate_limit::parser` table-driven regex classification, generalized from
//! one fixed table of regexes to a ruleset-supplied one.

use charon_types::SecurityRuleSet;
use regex::{Regex, RegexSet};
use std::sync::OnceLock;

static RULE_PATTERN_REGEX: OnceLock<Regex> = OnceLock::new();

fn rule_pattern_regex() -> &'static Regex {
    RULE_PATTERN_REGEX.get_or_init(|| Regex::new(r#"@rx\s+"([^"]*)""#).expect("valid regex"))
}

/// A ruleset with its `@rx` patterns pre-compiled into a single set for
/// fast matching.
pub struct CompiledRuleSet {
    pub name: String,
    set: Option<RegexSet>,
}

impl CompiledRuleSet {
    pub fn compile(ruleset: &SecurityRuleSet) -> Self {
        let patterns: Vec<&str> =
            rule_pattern_regex().captures_iter(&ruleset.content).map(|c| c.get(1).map_or("", |m| m.as_str())).collect();

        let set = if patterns.is_empty() { None } else { RegexSet::new(&patterns).ok() };
        Self { name: ruleset.name.clone(), set }
    }

    /// True iff any compiled pattern matches the combined request surface.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.set.as_ref().is_some_and(|set| set.is_match(haystack))
    }
}

/// Build the single string a ruleset is evaluated against: request target
/// (path + query), header values, and body when present (spec.md §4.2).
pub fn request_surface(path_and_query: &str, header_values: &[&str], body: Option<&str>) -> String {
    let mut surface = String::from(path_and_query);
    for value in header_values {
        surface.push('\n');
        surface.push_str(value);
    }
    if let Some(body) = body {
        surface.push('\n');
        surface.push_str(body);
    }
    surface
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ruleset(content: &str) -> SecurityRuleSet {
        SecurityRuleSet {
            uuid: Uuid::new_v4(),
            name: "owasp".into(),
            source_url: None,
            mode: charon_types::RuleSetMode::Blocking,
            content: content.into(),
        }
    }

    #[test]
    fn matches_script_tag_payload() {
        let rs = ruleset(r#"SecRule ARGS "@rx <script>" "id:1""#);
        let compiled = CompiledRuleSet::compile(&rs);
        assert!(compiled.is_match("/api/v1/system/my-ip?<script>=x"));
        assert!(!compiled.is_match("/api/v1/system/my-ip?q=hello"));
    }

    #[test]
    fn ruleset_with_no_patterns_never_matches() {
        let rs = ruleset("# comment only, no rules");
        let compiled = CompiledRuleSet::compile(&rs);
        assert!(!compiled.is_match("anything at all"));
    }

    #[test]
    fn request_surface_concatenates_all_parts() {
        let surface = request_surface("/x?y=1", &["ua-value"], Some("body-data"));
        assert!(surface.contains("/x?y=1"));
        assert!(surface.contains("ua-value"));
        assert!(surface.contains("body-data"));
    }
}
