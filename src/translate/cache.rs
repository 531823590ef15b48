use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use unicode_normalization::UnicodeNormalization;

use crate::candidates::Candidate;
use crate::error::{DeckError, Result};

/// Line separators that would corrupt a cache row: CR, LF, NEL, LS, PS.
const LINE_BREAKS: [char; 5] = ['\r', '\n', '\u{0085}', '\u{2028}', '\u{2029}'];

fn has_line_break(s: &str) -> bool {
    s.chars().any(|c| LINE_BREAKS.contains(&c))
}

/// Deterministic id for a translation cache row.
///
/// Keys are case sensitive. Internal whitespace in the sentence is
/// collapsed, as it does not change the learning experience; both word and
/// sentence are NFKC-normalized so visually identical inputs hash alike.
/// The engine version is part of the image: bumping it invalidates stale
/// rows without deleting them.
pub fn cache_id(
    word: &str,
    sentence: &str,
    source_lang_tag: &str,
    target_lang_tag: &str,
    engine_version: &str,
) -> Result<String> {
    if has_line_break(sentence) {
        return Err(DeckError::CacheId(
            "line break character found in sentence".to_string(),
        ));
    }
    if has_line_break(word) {
        return Err(DeckError::CacheId(
            "line break character found in word".to_string(),
        ));
    }

    let word_cleaned: String = word.trim().nfkc().collect();
    let sentence_collapsed = sentence.split_whitespace().collect::<Vec<_>>().join(" ");
    let sentence_cleaned: String = sentence_collapsed.nfkc().collect();

    if word_cleaned.is_empty() {
        return Err(DeckError::CacheId("empty word".to_string()));
    }
    if sentence_cleaned.is_empty() {
        return Err(DeckError::CacheId("empty sentence".to_string()));
    }
    if engine_version.is_empty() {
        return Err(DeckError::CacheId("empty engine version".to_string()));
    }

    // Sorted keys + compact separators keep the serialization stable.
    let image = BTreeMap::from([
        ("sentence", sentence_cleaned.as_str()),
        ("source_lang_tag", source_lang_tag),
        ("target_lang_tag", target_lang_tag),
        ("translation_ver", engine_version),
        ("word", word_cleaned.as_str()),
    ]);
    let canonical = serde_json::to_string(&image)?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Cache id for a candidate that already carries its example pair.
pub fn candidate_cache_id(candidate: &Candidate, engine_version: &str) -> Result<String> {
    let word = candidate
        .source_form
        .as_deref()
        .ok_or_else(|| DeckError::CacheId(format!("no source form for {}", candidate.lemma)))?;
    let sentence = candidate.source_sentence.as_deref().ok_or_else(|| {
        DeckError::CacheId(format!("no source sentence for {}", candidate.lemma))
    })?;
    cache_id(
        word,
        sentence,
        &candidate.source_lang_tag,
        &candidate.target_lang_tag,
        engine_version,
    )
}

/// One translation cache row. Field names on the wire match the cache
/// table's columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    #[serde(rename = "form_org_lang")]
    pub source_word: String,
    #[serde(rename = "sentence_org_lang")]
    pub source_sentence: String,
    #[serde(rename = "word_target_lang")]
    pub translated_word: String,
    #[serde(rename = "sentence_target_lang")]
    pub translated_sentence: String,
    #[serde(rename = "org_lang")]
    pub source_lang_tag: String,
    #[serde(rename = "target_lang")]
    pub target_lang_tag: String,
}
