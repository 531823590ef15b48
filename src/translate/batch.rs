use regex::RegexBuilder;
use tracing::{debug, info, warn};

use super::cache::{candidate_cache_id, CacheEntry};
use super::{Backoff, TranslationOutcome, TranslationProvider};
use crate::candidates::Candidate;
use crate::config::TranslateConfig;
use crate::error::{DeckError, Result};
use crate::ports::CacheStore;

const TERM_OPEN: &str = "<i>";
const TERM_CLOSE: &str = "</i>";

/// Wrap the first case-insensitive whole-word occurrence of `form` in
/// delimiter markers, preserving the original casing in the sentence.
fn tag_first(sentence: &str, form: &str) -> Result<String> {
    let pattern = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(form)))
        .case_insensitive(true)
        .build()
        .map_err(|e| DeckError::Translation(format!("bad term pattern: {}", e)))?;
    Ok(pattern
        .replace(sentence, |caps: &regex::Captures| {
            format!("{}{}{}", TERM_OPEN, &caps[0], TERM_CLOSE)
        })
        .into_owned())
}

/// Extract the marked span from a translated sentence. Empty when the
/// markers did not survive translation.
fn extract_term(text: &str) -> String {
    if let (Some(a), Some(b)) = (text.find(TERM_OPEN), text.find(TERM_CLOSE)) {
        if b > a {
            return text[a + TERM_OPEN.len()..b].to_string();
        }
    }
    String::new()
}

/// Drives the abstract translation capability in bounded rounds against a
/// shared content-addressed cache. Lookup, translation and upsert run
/// sequentially, batch by batch; outputs are reassembled by candidate
/// identity, so cancellation between rounds never loses upserted work.
pub struct BatchTranslator<'a> {
    provider: &'a dyn TranslationProvider,
    cache: &'a dyn CacheStore,
    backoff: &'a dyn Backoff,
    config: &'a TranslateConfig,
}

impl<'a> BatchTranslator<'a> {
    pub fn new(
        provider: &'a dyn TranslationProvider,
        cache: &'a dyn CacheStore,
        backoff: &'a dyn Backoff,
        config: &'a TranslateConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            backoff,
            config,
        }
    }

    /// Translate a selection, reusing every cached row it can. Returns all
    /// attempted candidates plus the side list of items whose translation
    /// could not be validated.
    pub async fn translate_selection(
        &self,
        selection: Vec<Candidate>,
    ) -> Result<TranslationOutcome> {
        let mut outcome = TranslationOutcome::default();

        // Candidates whose canonical inputs are rejected cannot be cached
        // or translated; they are reported, not dropped.
        let mut lookup: Vec<(Candidate, String)> = Vec::new();
        for candidate in selection {
            match candidate_cache_id(&candidate, &self.config.engine_version) {
                Ok(id) => lookup.push((candidate, id)),
                Err(e) => {
                    warn!("Cache id rejected for '{}': {}", candidate.lemma, e);
                    outcome.not_correctly_translated.push(candidate.clone());
                    outcome.translated.push(candidate);
                }
            }
        }

        let (cached, to_translate) = self.find_cached(lookup).await?;
        info!("Cached {} candidates", cached.len());
        info!("To translate {} candidates", to_translate.len());
        outcome.translated.extend(cached);

        let batch = self.config.translate_batch.max(1);
        let mut pending = to_translate;
        while !pending.is_empty() {
            let rest = pending.split_off(batch.min(pending.len()));
            let round = std::mem::replace(&mut pending, rest);
            self.translate_round(round, &mut outcome).await?;
        }

        Ok(outcome)
    }

    /// Look up cache rows in bounded groups and split the selection into
    /// already-translated candidates and ones still needing a provider call.
    async fn find_cached(
        &self,
        lookup: Vec<(Candidate, String)>,
    ) -> Result<(Vec<Candidate>, Vec<(Candidate, String)>)> {
        let mut cached = Vec::new();
        let mut to_translate = Vec::new();

        let batch = self.config.cache_lookup_batch.max(1);
        let mut pending = lookup;
        while !pending.is_empty() {
            let rest = pending.split_off(batch.min(pending.len()));
            let group = std::mem::replace(&mut pending, rest);

            let ids: Vec<String> = group.iter().map(|(_, id)| id.clone()).collect();
            let rows = self.cache.get_cached(&ids).await?;

            for (mut candidate, id) in group {
                match rows.get(&id) {
                    Some(row) => {
                        candidate.translated_word = Some(row.translated_word.clone());
                        candidate.translated_sentence = Some(row.translated_sentence.clone());
                        cached.push(candidate);
                    }
                    None => to_translate.push((candidate, id)),
                }
            }
        }

        Ok((cached, to_translate))
    }

    /// One bulk translation round. Valid results are queued and upserted at
    /// the end of the round; garbled results are recorded best-effort and
    /// flagged for caller-side triage.
    async fn translate_round(
        &self,
        round: Vec<(Candidate, String)>,
        outcome: &mut TranslationOutcome,
    ) -> Result<()> {
        let Some((first, _)) = round.first() else {
            return Ok(());
        };
        let source = first.source_lang_tag.clone();
        let target = first.target_lang_tag.clone();

        let mut sentences = Vec::with_capacity(round.len());
        for (candidate, _) in &round {
            let form = candidate.source_form.as_deref().unwrap_or_default();
            let sentence = candidate.source_sentence.as_deref().unwrap_or_default();
            sentences.push(tag_first(sentence, form)?);
        }

        let Some(results) = self.call_provider(&sentences, &source, &target).await? else {
            // Unrecoverable provider failure: this round's candidates are
            // failed-to-translate, the run continues.
            for (candidate, _) in round {
                outcome.not_correctly_translated.push(candidate.clone());
                outcome.translated.push(candidate);
            }
            return Ok(());
        };

        if results.len() != sentences.len() {
            return Err(DeckError::Translation(format!(
                "provider returned {} results for {} sentences",
                results.len(),
                sentences.len()
            )));
        }

        let mut entries: Vec<CacheEntry> = Vec::new();
        for ((mut candidate, id), translated_sentence) in round.into_iter().zip(results) {
            let translated_word = extract_term(&translated_sentence);
            debug!("Translated '{}' -> '{}'", candidate.lemma, translated_word);

            candidate.translated_word = Some(translated_word.clone());
            candidate.translated_sentence = Some(translated_sentence.clone());

            if translated_word.is_empty() {
                warn!("Term markers lost in translation for '{}'", candidate.lemma);
                outcome.not_correctly_translated.push(candidate.clone());
            } else {
                entries.push(CacheEntry {
                    id,
                    source_word: candidate.source_form.clone().unwrap_or_default(),
                    source_sentence: candidate.source_sentence.clone().unwrap_or_default(),
                    translated_word,
                    translated_sentence,
                    source_lang_tag: candidate.source_lang_tag.clone(),
                    target_lang_tag: candidate.target_lang_tag.clone(),
                });
            }
            outcome.translated.push(candidate);
        }

        if !entries.is_empty() {
            // Rows are content-addressed; a failed write only costs a
            // future cache miss.
            if let Err(e) = self.cache.upsert_cache_translation(&entries).await {
                warn!("Failed to cache {} translations: {}", entries.len(), e);
            }
        }

        Ok(())
    }

    /// Call the provider once, retrying a single time after a rate-limit
    /// signal. A second rate limit on the same batch is fatal; any other
    /// provider failure downgrades to a per-batch loss.
    async fn call_provider(
        &self,
        sentences: &[String],
        source: &str,
        target: &str,
    ) -> Result<Option<Vec<String>>> {
        match self.provider.translate(sentences, source, target).await {
            Ok(results) => Ok(Some(results)),
            Err(DeckError::RateLimited(msg)) => {
                warn!("Provider rate limited ({}), backing off before retry", msg);
                self.backoff.pause().await;
                match self.provider.translate(sentences, source, target).await {
                    Ok(results) => Ok(Some(results)),
                    Err(e @ DeckError::RateLimited(_)) => Err(e),
                    Err(e) => {
                        warn!("Translation batch failed after retry: {}", e);
                        Ok(None)
                    }
                }
            }
            Err(e) => {
                warn!("Translation batch failed: {}", e);
                Ok(None)
            }
        }
    }
}
