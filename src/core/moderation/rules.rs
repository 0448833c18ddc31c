// Content rules - the closed set of predicates the classifier can evaluate.
//
// A rule is loaded from a `RuleConfig` (the JSON form) and compiled once into
// a `Rule`. Compiled rules are immutable; the classifier only reads them.

use super::classifier::ConfigurationError;
use aho_corasick::AhoCorasick;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Matches URLs with or without a scheme, e.g. `https://a.example/x`, `bit.ly/abc`
/// or `пример.рф`. Labels may be any letters; punycode TLDs are tried first.
const LINK_PATTERN: &str = r"(?i)\b(?:https?://)?(?:[\p{L}\p{N}](?:[\p{L}\p{N}-]*[\p{L}\p{N}])?\.)+(?:xn--[a-z0-9-]+|\p{L}{2,})(?::\d+)?(?:/\S*)?";

// ============================================================================
// CONFIG FORM
// ============================================================================

/// What a rule looks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RulePattern {
    /// Any of the keywords appears anywhere in the text
    Keywords { keywords: Vec<String> },
    /// Regular expression, always case-insensitive
    Regex { pattern: String },
    /// A link points at one of the domains (or a subdomain of one).
    /// Internationalized names may be written in Unicode or punycode.
    Domains { domains: Vec<String> },
}

/// A rule as written in the moderation config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub label: String,
    pub weight: f64,
    /// Only counts for members that are still on probation
    #[serde(default)]
    pub probation_only: bool,
    pub pattern: RulePattern,
}

impl RuleConfig {
    pub fn keywords(label: &str, weight: f64, probation_only: bool, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            weight,
            probation_only,
            pattern: RulePattern::Keywords {
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
            },
        }
    }

    pub fn regex(label: &str, weight: f64, probation_only: bool, pattern: &str) -> Self {
        Self {
            label: label.to_string(),
            weight,
            probation_only,
            pattern: RulePattern::Regex {
                pattern: pattern.to_string(),
            },
        }
    }

    pub fn domains(label: &str, weight: f64, probation_only: bool, domains: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            weight,
            probation_only,
            pattern: RulePattern::Domains {
                domains: domains.iter().map(|d| d.to_string()).collect(),
            },
        }
    }
}

// ============================================================================
// COMPILED RULES
// ============================================================================

#[derive(Debug)]
enum Matcher {
    /// Keywords are stored lowercased and matched against lowercased text.
    Keywords(AhoCorasick),
    Regex(Regex),
    /// Domains are stored in the ASCII form `url` gives hosts.
    Domains { links: Regex, domains: Vec<String> },
}

/// A compiled, immutable content rule.
#[derive(Debug)]
pub struct Rule {
    label: String,
    weight: f64,
    probation_only: bool,
    matcher: Matcher,
}

impl Rule {
    /// Validate and compile a single rule.
    pub fn compile(config: &RuleConfig) -> Result<Self, ConfigurationError> {
        let label = config.label.trim();
        if label.is_empty() {
            return Err(ConfigurationError::InvalidRule {
                label: config.label.clone(),
                reason: "label must not be empty".to_string(),
            });
        }

        if !config.weight.is_finite() || config.weight < 0.0 {
            return Err(ConfigurationError::InvalidRule {
                label: label.to_string(),
                reason: format!("weight must be a non-negative number, got {}", config.weight),
            });
        }

        let invalid = |reason: String| ConfigurationError::InvalidRule {
            label: label.to_string(),
            reason,
        };

        let matcher = match &config.pattern {
            RulePattern::Keywords { keywords } => {
                let keywords: Vec<String> = keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                if keywords.is_empty() {
                    return Err(invalid("keyword list is empty".to_string()));
                }
                let automaton = AhoCorasick::new(&keywords)
                    .map_err(|e| invalid(format!("failed to build keyword matcher: {}", e)))?;
                Matcher::Keywords(automaton)
            }
            RulePattern::Regex { pattern } => {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| invalid(format!("invalid regex: {}", e)))?;
                Matcher::Regex(regex)
            }
            RulePattern::Domains { domains } => {
                let mut normalized = Vec::with_capacity(domains.len());
                for domain in domains.iter().filter(|d| !d.trim().is_empty()) {
                    let ascii = normalize_domain(domain)
                        .ok_or_else(|| invalid(format!("'{}' is not a domain name", domain)))?;
                    normalized.push(ascii);
                }
                if normalized.is_empty() {
                    return Err(invalid("domain list is empty".to_string()));
                }
                let links = Regex::new(LINK_PATTERN)
                    .map_err(|e| invalid(format!("failed to build link matcher: {}", e)))?;
                Matcher::Domains {
                    links,
                    domains: normalized,
                }
            }
        };

        Ok(Self {
            label: label.to_string(),
            weight: config.weight,
            probation_only: config.probation_only,
            matcher,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_probation_only(&self) -> bool {
        self.probation_only
    }

    /// Check the rule against a message.
    ///
    /// `lowercased` must be `text.to_lowercase()`; the classifier computes it
    /// once per message instead of once per rule.
    pub fn matches(&self, text: &str, lowercased: &str) -> bool {
        match &self.matcher {
            Matcher::Keywords(automaton) => automaton.is_match(lowercased),
            Matcher::Regex(regex) => regex.is_match(text),
            Matcher::Domains { links, domains } => links
                .find_iter(lowercased)
                .filter_map(|m| link_host(m.as_str()))
                .any(|host| domains.iter().any(|d| host_matches(&host, d))),
        }
    }
}

/// Extract the host of a link found in message text.
fn link_host(link: &str) -> Option<String> {
    let candidate = if link.contains("://") {
        link.to_string()
    } else {
        format!("http://{}", link)
    };
    url::Url::parse(&candidate)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_end_matches('.').to_string()))
}

/// Bring a configured domain into the same form as a parsed host.
fn normalize_domain(domain: &str) -> Option<String> {
    let domain = domain.trim().trim_matches('.');
    if domain.is_empty() || domain.contains(['/', ':', '?', '#', '@']) {
        return None;
    }
    url::Url::parse(&format!("http://{}", domain))
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

// ============================================================================
// RULE SET
// ============================================================================

/// Ordered, immutable collection of compiled rules.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile every rule, rejecting duplicate labels.
    pub fn compile(configs: &[RuleConfig]) -> Result<Self, ConfigurationError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(configs.len());

        for config in configs {
            let rule = Rule::compile(config)?;
            if !seen.insert(rule.label().to_string()) {
                return Err(ConfigurationError::DuplicateLabel(rule.label().to_string()));
            }
            rules.push(rule);
        }

        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(rule: &Rule, text: &str) -> bool {
        rule.matches(text, &text.to_lowercase())
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let rule =
            Rule::compile(&RuleConfig::keywords("promo", 3.0, false, &["Free Money"])).unwrap();

        assert!(check(&rule, "get FREE money now"));
        assert!(check(&rule, "free moneyyyy"));
        assert!(!check(&rule, "money for free"));
    }

    #[test]
    fn test_keywords_fold_non_ascii_case() {
        let rule = Rule::compile(&RuleConfig::keywords("earn", 3.0, false, &["Заработок"])).unwrap();

        assert!(check(&rule, "ЛЁГКИЙ ЗАРАБОТОК в сети"));
    }

    #[test]
    fn test_regex_is_case_insensitive() {
        let rule = Rule::compile(&RuleConfig::regex("dm", 4.0, false, r"\bdm me\b")).unwrap();

        assert!(check(&rule, "Interested? DM ME for details"));
        assert!(!check(&rule, "admme"));
    }

    #[test]
    fn test_domain_rule_matches_hosts_and_subdomains() {
        let rule =
            Rule::compile(&RuleConfig::domains("shorteners", 5.0, false, &["bit.ly"])).unwrap();

        assert!(check(&rule, "look https://bit.ly/abc"));
        assert!(check(&rule, "look at BIT.LY/abc"));
        assert!(check(&rule, "http://go.bit.ly/x"));
        assert!(!check(&rule, "https://notbit.ly/abc"));
        assert!(!check(&rule, "nothing to see here"));
    }

    #[test]
    fn test_domain_rule_matches_internationalized_names() {
        let unicode =
            Rule::compile(&RuleConfig::domains("ru_shop", 5.0, false, &["пример.рф"])).unwrap();

        assert!(check(&unicode, "заходи на пример.рф/акция"));
        assert!(check(&unicode, "https://shop.ПРИМЕР.РФ"));
        assert!(check(&unicode, "http://xn--e1afmkfd.xn--p1ai/"));
        assert!(!check(&unicode, "пример.ру"));

        let punycode = Rule::compile(&RuleConfig::domains(
            "ru_shop",
            5.0,
            false,
            &["xn--e1afmkfd.xn--p1ai"],
        ))
        .unwrap();
        assert!(check(&punycode, "заходи на пример.рф"));
    }

    #[test]
    fn test_domain_rule_rejects_non_domains() {
        for bad in ["discord.com/invite", "bad domain", "user@t.me"] {
            assert!(
                matches!(
                    Rule::compile(&RuleConfig::domains("d", 1.0, false, &[bad])),
                    Err(ConfigurationError::InvalidRule { .. })
                ),
                "{} should be rejected",
                bad
            );
        }
        assert!(Rule::compile(&RuleConfig::domains("d", 1.0, false, &[" "])).is_err());
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        let negative = RuleConfig::keywords("neg", -1.0, false, &["x"]);
        assert!(matches!(
            Rule::compile(&negative),
            Err(ConfigurationError::InvalidRule { .. })
        ));

        let not_a_number = RuleConfig::keywords("nan", f64::NAN, false, &["x"]);
        assert!(Rule::compile(&not_a_number).is_err());

        let empty_keywords = RuleConfig::keywords("empty", 1.0, false, &["  "]);
        assert!(Rule::compile(&empty_keywords).is_err());

        let bad_regex = RuleConfig::regex("bad", 1.0, false, "(unclosed");
        assert!(Rule::compile(&bad_regex).is_err());

        let no_label = RuleConfig::keywords(" ", 1.0, false, &["x"]);
        assert!(Rule::compile(&no_label).is_err());
    }

    #[test]
    fn test_duplicate_labels_are_rejected() {
        let configs = vec![
            RuleConfig::keywords("links", 1.0, false, &["http"]),
            RuleConfig::regex("links", 2.0, false, "www"),
        ];

        assert!(matches!(
            RuleSet::compile(&configs),
            Err(ConfigurationError::DuplicateLabel(label)) if label == "links"
        ));
    }

    #[test]
    fn test_rule_config_json_shape() {
        let json = r#"{
            "label": "links",
            "weight": 10,
            "probation_only": true,
            "pattern": { "type": "keywords", "keywords": ["http://"] }
        }"#;

        let config: RuleConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, RuleConfig::keywords("links", 10.0, true, &["http://"]));

        let json = r#"{ "label": "d", "weight": 1.5, "pattern": { "type": "domains", "domains": ["t.me"] } }"#;
        let config: RuleConfig = serde_json::from_str(json).unwrap();
        assert!(!config.probation_only);
    }
}
