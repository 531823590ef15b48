use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{DeckError, Result};
use crate::lexicon::LexiconSnapshot;
use crate::request::BuildRequest;

/// One study-set candidate projected out of the snapshot. Built by
/// `select_candidates`, scored by `score_and_rank`, given its example pair
/// by `select_examples` and its translation by the batch translator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub lemma: String,
    pub pos: String,
    pub forms: Vec<String>,
    /// Aggregate token count across included forms.
    pub freq: u64,
    /// Aggregate coverage share across included forms, 0..1.
    pub cov_share: f64,
    #[serde(default)]
    pub score: Option<f64>,

    // Populated at example selection
    #[serde(default)]
    pub source_form: Option<String>,
    #[serde(default)]
    pub source_sentence: Option<String>,

    // Populated at translation
    #[serde(default)]
    pub translated_word: Option<String>,
    #[serde(default)]
    pub translated_sentence: Option<String>,

    pub source_lang_tag: String,
    pub target_lang_tag: String,
}

/// Project the snapshot into candidates, filtered by the POS allow-list and
/// the known-lemma exclusion set. Zero-coverage entries are kept here and
/// dropped later by the picker's bucketization.
pub fn select_candidates(snapshot: &LexiconSnapshot, req: &BuildRequest) -> Vec<Candidate> {
    let known: HashSet<&str> = req
        .exclude_known_lemmas
        .iter()
        .map(String::as_str)
        .collect();
    let allowed: Option<HashSet<&str>> = req
        .include_pos
        .as_ref()
        .filter(|pos| !pos.is_empty())
        .map(|pos| pos.iter().map(String::as_str).collect());

    let mut out = Vec::new();
    for (lemma, entry) in &snapshot.entries {
        if let Some(allowed) = &allowed {
            if !allowed.contains(entry.pos.as_str()) {
                continue;
            }
        }
        if known.contains(lemma.as_str()) {
            continue;
        }
        if !entry.to_learn {
            continue;
        }

        out.push(Candidate {
            lemma: lemma.clone(),
            pos: entry.pos.clone(),
            forms: entry.forms.clone(),
            freq: entry.total_freq(),
            cov_share: entry.total_cov(),
            score: None,
            source_form: None,
            source_sentence: None,
            translated_word: None,
            translated_sentence: None,
            source_lang_tag: entry.lang.clone(),
            target_lang_tag: req.target_lang_tag.clone(),
        });
    }

    debug!(
        "Selected {} candidates from {} lemmas",
        out.len(),
        snapshot.entries.len()
    );
    out
}

/// Score candidates and sort descending. The score is the aggregate
/// coverage share; ties keep their incoming order (stable sort).
pub fn score_and_rank(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    for candidate in &mut candidates {
        candidate.score = Some(candidate.cov_share);
    }
    candidates.sort_by(|a, b| {
        b.cov_share
            .partial_cmp(&a.cov_share)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Choose one sentence out of a form's example pool: length bounds first,
/// then multi-word preference, then the dedupe set. Each filter falls back
/// to the previous pool when it empties.
fn pick_best<'a>(
    examples: &'a [String],
    min_len: usize,
    max_len: usize,
    dedupe: bool,
    seen: &mut HashSet<String>,
) -> Option<&'a String> {
    if examples.is_empty() {
        return None;
    }
    let bounded: Vec<&String> = examples
        .iter()
        .filter(|e| (min_len..=max_len).contains(&word_count(e)))
        .collect();
    let pool = if bounded.is_empty() {
        examples.iter().collect::<Vec<_>>()
    } else {
        bounded
    };

    let multi: Vec<&String> = pool
        .iter()
        .filter(|e| word_count(e) > 1)
        .copied()
        .collect();
    let pool = if multi.is_empty() { pool } else { multi };

    if dedupe {
        for e in &pool {
            if !seen.contains(*e) {
                seen.insert((*e).clone());
                return Some(*e);
            }
        }
        // All candidates were already used elsewhere in this build; still
        // return something deterministic.
        return pool.first().copied();
    }
    pool.first().copied()
}

/// Attach exactly one (form, sentence) pair to every picked candidate.
/// A candidate whose forms have no recorded example sentences aborts the
/// build: a card cannot be rendered without an example.
pub fn select_examples(
    selection: &mut [Candidate],
    snapshot: &LexiconSnapshot,
    req: &BuildRequest,
) -> Result<()> {
    let opts = req.example_options();
    let mut seen: HashSet<String> = HashSet::new();

    for candidate in selection.iter_mut() {
        let entry = snapshot
            .entry(&candidate.lemma)
            .ok_or_else(|| DeckError::MissingExample(candidate.lemma.clone()))?;

        let mut chosen: Option<(String, String)> = None;
        for form in &candidate.forms {
            let Some(examples) = entry.examples.get(form) else {
                continue;
            };
            if let Some(sentence) = pick_best(
                examples,
                opts.min_example_len,
                opts.max_example_len,
                req.dedupe_sentences,
                &mut seen,
            ) {
                chosen = Some((form.clone(), sentence.clone()));
                break;
            }
        }

        let (form, sentence) =
            chosen.ok_or_else(|| DeckError::MissingExample(candidate.lemma.clone()))?;
        candidate.source_form = Some(form);
        candidate.source_sentence = Some(sentence);
    }

    Ok(())
}
