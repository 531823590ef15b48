use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{DeckError, Result};

/// Per-language bounds on example sentence length, in words.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleOptions {
    pub min_example_len: usize,
    pub max_example_len: usize,
}

impl Default for ExampleOptions {
    fn default() -> Self {
        Self {
            min_example_len: 1,
            max_example_len: usize::MAX,
        }
    }
}

/// Request to build a deck of flashcards from an analyzed snapshot.
/// Immutable once the picker starts; `validate` runs before any allocation
/// decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub job_id: String,
    pub deck_name: String,
    /// Stop once cumulative coverage reaches this fraction, when set.
    pub target_coverage: Option<f64>,
    /// Card-count cap; absent means "all".
    pub max_cards: Option<usize>,
    /// POS allow-list; absent or empty admits every POS.
    #[serde(default)]
    pub include_pos: Option<Vec<String>>,
    /// Hard caps, as shares of the deck limit. Sum must stay <= 1.
    #[serde(default)]
    pub max_share_per_pos: HashMap<String, f64>,
    /// Soft proportions to steer toward; re-normalized before use.
    #[serde(default)]
    pub target_share_per_pos: HashMap<String, f64>,
    #[serde(default)]
    pub exclude_known_lemmas: Vec<String>,
    #[serde(default)]
    pub dedupe_sentences: bool,
    /// Language tag -> example selection options.
    #[serde(default)]
    pub lang_opts: HashMap<String, ExampleOptions>,
    pub source_lang_tag: String,
    pub target_lang_tag: String,
    pub build_version: String,
    pub requested_by: String,
    pub requested_at: String,
}

impl BuildRequest {
    /// Reject out-of-range knobs before any allocation begins.
    pub fn validate(&self) -> Result<()> {
        if let Some(tc) = self.target_coverage {
            if !(0.0..=1.0).contains(&tc) {
                return Err(DeckError::Validation(
                    "target_coverage must be within [0, 1]".to_string(),
                ));
            }
        }
        if matches!(self.max_cards, Some(0)) {
            return Err(DeckError::Validation(
                "max_cards must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Example bounds for the request's source language, defaulting to
    /// unbounded when the language has no options.
    pub fn example_options(&self) -> ExampleOptions {
        self.lang_opts
            .get(&self.source_lang_tag)
            .cloned()
            .unwrap_or_default()
    }
}
