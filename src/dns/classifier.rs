//! Per-query classification over the three lists.
//!
//! Rules are evaluated in order and the first match wins. The default order
//! is whitelist, keyword, blocklist; anything left over is allowed.

use crate::lists::{ListKind, Lists};

/// Outcome of classifying a question name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Forward upstream. Carries the whitelist entry when one matched.
    Allow { whitelisted: Option<String> },
    /// Name equals, or is a subdomain of, a blocklist entry.
    BlockDomain(String),
    /// Name contains a keyword.
    BlockKeyword(String),
}

impl Verdict {
    #[inline]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::BlockDomain(_) | Self::BlockKeyword(_))
    }

    /// Which list produced the verdict, if any.
    pub const fn matched_list(&self) -> Option<ListKind> {
        match self {
            Self::Allow { whitelisted: None } => None,
            Self::Allow { whitelisted: Some(_) } => Some(ListKind::Whitelist),
            Self::BlockDomain(_) => Some(ListKind::Blocklist),
            Self::BlockKeyword(_) => Some(ListKind::Keywords),
        }
    }

    /// The list entry that matched.
    pub fn matched_entry(&self) -> Option<&str> {
        match self {
            Self::Allow { whitelisted } => whitelisted.as_deref(),
            Self::BlockDomain(entry) | Self::BlockKeyword(entry) => Some(entry),
        }
    }
}

/// A single classification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Whitelist,
    Keyword,
    Blocklist,
}

impl Rule {
    fn evaluate(self, name: &str, lists: &Lists) -> Option<Verdict> {
        match self {
            Self::Whitelist => lists
                .whitelist()
                .iter()
                .find(|entry| is_domain_match(name, entry))
                .map(|entry| Verdict::Allow {
                    whitelisted: Some(entry.clone()),
                }),
            Self::Keyword => lists
                .keywords()
                .iter()
                .find(|keyword| !keyword.is_empty() && name.contains(keyword.as_str()))
                .map(|keyword| Verdict::BlockKeyword(keyword.clone())),
            Self::Blocklist => lists
                .blocklist()
                .iter()
                .find(|entry| is_domain_match(name, entry))
                .map(|entry| Verdict::BlockDomain(entry.clone())),
        }
    }
}

/// Default evaluation order.
pub const DEFAULT_RULES: [Rule; 3] = [Rule::Whitelist, Rule::Keyword, Rule::Blocklist];

/// An ordered rule table.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::with_rules(DEFAULT_RULES)
    }

    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classify `name` against `lists`. Matching is case-insensitive.
    pub fn classify(&self, name: &str, lists: &Lists) -> Verdict {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        self.rules
            .iter()
            .find_map(|rule| rule.evaluate(&name, lists))
            .unwrap_or(Verdict::Allow { whitelisted: None })
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify with the default rule order.
pub fn classify(name: &str, lists: &Lists) -> Verdict {
    Classifier::new().classify(name, lists)
}

/// `name == entry` or `name` ends with `"." + entry`, without allocating.
#[inline]
fn is_domain_match(name: &str, entry: &str) -> bool {
    if entry.is_empty() {
        return false;
    }
    match name.strip_suffix(entry) {
        Some("") => true,
        Some(prefix) => prefix.ends_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists(blocklist: &[&str], whitelist: &[&str], keywords: &[&str]) -> Lists {
        Lists::new(blocklist, whitelist, keywords)
    }

    #[test]
    fn should_block_exact_and_subdomains_of_blocklisted_domain() {
        let lists = lists(&["ads.example.com"], &[], &[]);

        for name in ["ads.example.com", "x.ads.example.com", "a.b.ads.example.com"] {
            assert_eq!(
                classify(name, &lists),
                Verdict::BlockDomain("ads.example.com".into()),
                "{name}"
            );
        }
        assert_eq!(
            classify("example.com", &lists),
            Verdict::Allow { whitelisted: None }
        );
    }

    #[test]
    fn should_not_match_on_partial_label() {
        let lists = lists(&["example.com"], &[], &[]);

        assert!(!classify("badexample.com", &lists).is_blocked());
        assert!(!classify("example.com.evil", &lists).is_blocked());
        assert!(classify("www.example.com", &lists).is_blocked());
    }

    #[test]
    fn should_let_whitelist_override_blocklist_and_keywords() {
        let lists = lists(&["example.com"], &["cdn-ads.example.com"], &["ads"]);

        let verdict = classify("img.cdn-ads.example.com", &lists);
        assert_eq!(
            verdict,
            Verdict::Allow {
                whitelisted: Some("cdn-ads.example.com".into())
            }
        );
        assert_eq!(verdict.matched_list(), Some(ListKind::Whitelist));
        assert!(classify("other.example.com", &lists).is_blocked());
    }

    #[test]
    fn should_block_keyword_substrings() {
        let lists = lists(&[], &[], &["ads"]);

        let verdict = classify("cdn-ads.example.com", &lists);
        assert_eq!(verdict, Verdict::BlockKeyword("ads".into()));
        assert_eq!(verdict.matched_list(), Some(ListKind::Keywords));
        assert_eq!(verdict.matched_entry(), Some("ads"));
        assert!(!classify("example.com", &lists).is_blocked());
    }

    #[test]
    fn should_prefer_keyword_over_blocklist() {
        let lists = lists(&["tracker.net"], &[], &["track"]);
        assert_eq!(
            classify("tracker.net", &lists),
            Verdict::BlockKeyword("track".into())
        );
    }

    #[test]
    fn should_never_match_empty_keyword() {
        let mut lists = lists(&[], &[], &[]);
        lists.keywords_mut().push(String::new());

        assert!(!classify("anything.example.com", &lists).is_blocked());
        assert!(!classify("", &lists).is_blocked());
    }

    #[test]
    fn should_match_case_insensitively() {
        let lists = lists(&["Ads.Example.COM"], &[], &["TRACK"]);

        assert!(classify("ADS.EXAMPLE.COM", &lists).is_blocked());
        assert!(classify("X.Ads.Example.Com", &lists).is_blocked());
        assert!(classify("MyTracker.io", &lists).is_blocked());
    }

    #[test]
    fn should_fold_entries_and_names_alike() {
        let lists = lists(&["ÄDS.example.com"], &[], &["PIXÉL"]);

        assert!(classify("ÄDS.EXAMPLE.COM", &lists).is_blocked());
        assert!(classify("cdn.PIXÉL.io", &lists).is_blocked());
        assert!(!classify("äds.example.com", &lists).is_blocked());
    }

    #[test]
    fn should_allow_root_query() {
        let lists = lists(&["example.com"], &["safe.com"], &["ads"]);
        assert_eq!(classify("", &lists), Verdict::Allow { whitelisted: None });
    }

    #[test]
    fn should_honor_custom_rule_order() {
        let lists = lists(&["example.com"], &["example.com"], &[]);
        let classifier = Classifier::with_rules([Rule::Blocklist, Rule::Whitelist]);

        assert_eq!(classifier.rules(), &[Rule::Blocklist, Rule::Whitelist]);
        assert!(classifier.classify("example.com", &lists).is_blocked());
        assert!(!classify("example.com", &lists).is_blocked());
    }

    #[test]
    fn should_ignore_trailing_dot_in_name() {
        let lists = lists(&["example.com"], &[], &[]);
        assert!(classify("www.example.com.", &lists).is_blocked());
    }
}
