use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// A canonical term and the alternative spellings that mean the same thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymGroup {
    pub canonical: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// Query expansion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionConfig {
    /// Cap on added terms per matched group.
    #[serde(default = "default_max_synonyms")]
    pub max_synonyms: usize,
    #[serde(default)]
    pub groups: Vec<SynonymGroup>,
}

fn default_max_synonyms() -> usize {
    10
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            max_synonyms: default_max_synonyms(),
            groups: Vec::new(),
        }
    }
}

/// Terms found in a query and the terms added because of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    /// Canonical names of the groups that matched.
    pub matched: Vec<String>,
    /// Extra terms for lexical scoring, in group order, without duplicates.
    pub added_terms: Vec<String>,
}

/// Adds related terms to a query before lexical scoring.
pub trait QueryExpander: Send + Sync {
    fn expand(&self, query: &str) -> Expansion;
}

/// Dictionary-driven expander.
///
/// A group matches when its canonical term or any synonym occurs in the query
/// text (ASCII case-insensitive substring match, so it also finds terms inside
/// unsegmented CJK runs). Every other term of a matched group that is not
/// already in the query is added, at most `max_synonyms` per group.
#[derive(Debug, Clone)]
pub struct RuleBasedExpander {
    groups: Vec<SynonymGroup>,
    max_synonyms: usize,
}

impl RuleBasedExpander {
    pub fn new(groups: Vec<SynonymGroup>, max_synonyms: usize) -> Self {
        Self {
            groups,
            max_synonyms,
        }
    }

    pub fn from_config(config: &ExpansionConfig) -> Self {
        Self::new(config.groups.clone(), config.max_synonyms)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl QueryExpander for RuleBasedExpander {
    fn expand(&self, query: &str) -> Expansion {
        let text = query.to_ascii_lowercase();
        let occurs = |term: &str| !term.is_empty() && text.contains(&term.to_ascii_lowercase());

        let mut expansion = Expansion::default();
        let mut seen: HashSet<String> = HashSet::new();

        for group in &self.groups {
            let terms =
                std::iter::once(&group.canonical).chain(group.synonyms.iter());
            if !terms.clone().any(|t| occurs(t)) {
                continue;
            }
            expansion.matched.push(group.canonical.clone());

            let additions = terms
                .filter(|t| !t.is_empty() && !occurs(t))
                .take(self.max_synonyms);
            for term in additions {
                if seen.insert(term.clone()) {
                    expansion.added_terms.push(term.clone());
                }
            }
        }

        if !expansion.matched.is_empty() {
            debug!(
                matched = expansion.matched.len(),
                added = expansion.added_terms.len(),
                "Expanded query"
            );
        }
        expansion
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn expander(max: usize) -> RuleBasedExpander {
        RuleBasedExpander::new(
            vec![
                SynonymGroup {
                    canonical: "転倒".into(),
                    synonyms: vec!["転落".into(), "fall".into()],
                },
                SynonymGroup {
                    canonical: "BP".into(),
                    synonyms: vec!["blood pressure".into(), "血圧".into()],
                },
            ],
            max,
        )
    }

    #[test]
    fn test_synonym_adds_canonical_and_siblings() {
        let e = expander(10).expand("Fall prevention checklist");
        assert_eq!(e.matched, vec!["転倒"]);
        assert_eq!(e.added_terms, vec!["転倒", "転落"]);
    }

    #[test]
    fn test_matches_inside_cjk_run() {
        let e = expander(10).expand("転倒予防の手順");
        assert_eq!(e.matched, vec!["転倒"]);
        assert_eq!(e.added_terms, vec!["転落", "fall"]);
    }

    #[test]
    fn test_ascii_case_insensitive() {
        let e = expander(10).expand("check bp twice");
        assert_eq!(e.matched, vec!["BP"]);
        assert_eq!(e.added_terms, vec!["blood pressure", "血圧"]);
    }

    #[test]
    fn test_max_synonyms_caps_each_group() {
        let e = expander(1).expand("転倒 and BP");
        assert_eq!(e.added_terms, vec!["転落", "blood pressure"]);
    }

    #[test]
    fn test_no_match() {
        let e = expander(10).expand("medication schedule");
        assert!(e.matched.is_empty());
        assert!(e.added_terms.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let config: ExpansionConfig = toml::from_str(
            r#"
            [[groups]]
            canonical = "bedsore"
            synonyms = ["pressure ulcer", "decubitus"]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_synonyms, 10);
        let e = RuleBasedExpander::from_config(&config).expand("decubitus care");
        assert_eq!(e.added_terms, vec!["bedsore", "pressure ulcer"]);
    }
}
