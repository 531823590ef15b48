use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One analyzed lemma: POS tag, inflected forms, per-form frequency and
/// coverage share, and the example sentences recorded per form. Produced by
/// the external analysis stage and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LemmaEntry {
    pub pos: String,
    pub forms: Vec<String>,
    /// Per-form token counts.
    #[serde(default)]
    pub forms_freq: HashMap<String, u64>,
    /// Per-form coverage share, each in [0, 1].
    #[serde(default)]
    pub forms_cov: HashMap<String, f64>,
    /// Form -> example sentences observed in the source content.
    #[serde(default)]
    pub examples: HashMap<String, Vec<String>>,
    /// BCP-47 tag of the source language.
    pub lang: String,
    /// Cleared by the analysis stage for function words not worth studying.
    #[serde(default = "default_to_learn")]
    pub to_learn: bool,
}

fn default_to_learn() -> bool {
    true
}

impl LemmaEntry {
    /// Aggregate token count across all recorded forms.
    pub fn total_freq(&self) -> u64 {
        self.forms_freq.values().sum()
    }

    /// Aggregate coverage share across all recorded forms.
    pub fn total_cov(&self) -> f64 {
        self.forms_cov.values().sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub total_tokens: u64,
    pub total_types: u64,
    pub total_lemmas: u64,
}

/// Analyzed lexical snapshot of one piece of content, keyed by lemma.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexiconSnapshot {
    pub name: String,
    pub entries: HashMap<String, LemmaEntry>,
    #[serde(default)]
    pub stats: Option<SnapshotStats>,
}

impl LexiconSnapshot {
    pub fn entry(&self, lemma: &str) -> Option<&LemmaEntry> {
        self.entries.get(lemma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> LemmaEntry {
        LemmaEntry {
            pos: "VERB".to_string(),
            forms: vec!["går".to_string(), "gick".to_string()],
            forms_freq: HashMap::from([("går".to_string(), 12), ("gick".to_string(), 3)]),
            forms_cov: HashMap::from([("går".to_string(), 0.04), ("gick".to_string(), 0.01)]),
            examples: HashMap::new(),
            lang: "sv".to_string(),
            to_learn: true,
        }
    }

    #[test]
    fn aggregates_sum_over_forms() {
        let e = entry();
        assert_eq!(e.total_freq(), 15);
        assert!((e.total_cov() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn to_learn_defaults_to_true_when_absent() {
        let json = r#"{"pos":"NOUN","forms":["hus"],"lang":"sv"}"#;
        let e: LemmaEntry = serde_json::from_str(json).unwrap();
        assert!(e.to_learn);
        assert_eq!(e.total_freq(), 0);
    }
}
