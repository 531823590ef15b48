use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::candidates::Candidate;
use crate::request::BuildRequest;
use crate::versions::BUILD_VERSION;

/// Minimal unit for study/export. Front: lemma + source sentence; back:
/// translated word + translated sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Stable hash of the card's semantic content.
    pub id: String,
    pub lemma: String,
    pub prompt: String,
    pub answer: String,
    pub sentence: Option<String>,
    pub sentence_translation: Option<String>,
    pub pos: Option<String>,
    pub source_lang_tag: String,
    pub target_lang_tag: String,
    pub build_version: String,
}

impl Card {
    /// Stable short id from relevant content.
    pub fn make_id(parts: &[&str]) -> String {
        let payload = parts.join("||");
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        format!("{:x}", hasher.finalize())[..16].to_string()
    }
}

/// Deck metadata with just enough stats to cache and display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deck {
    pub deck_name: String,
    pub job_id: String,
    pub build_version: String,
    pub card_count: usize,
    pub unique_lemmas: usize,
    /// 0..1, from the pick report.
    pub achieved_coverage: f64,
    /// Hash of (deck name + material knobs + build version); ties a cached
    /// deck to the request that produced it.
    pub idempotency_key: String,
}

impl Deck {
    pub fn make_idempotency_key(parts: &[&str]) -> String {
        let payload = serde_json::to_string(parts).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn build(req: &BuildRequest, cards: &[Card], achieved_coverage: f64) -> Self {
        let unique_lemmas = cards
            .iter()
            .map(|c| c.lemma.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();
        let knobs = serde_json::to_string(req).unwrap_or_default();
        let idempotency_key =
            Self::make_idempotency_key(&[&req.deck_name, &knobs, &req.build_version]);

        Self {
            deck_name: req.deck_name.clone(),
            job_id: req.job_id.clone(),
            build_version: req.build_version.clone(),
            card_count: cards.len(),
            unique_lemmas,
            achieved_coverage,
            idempotency_key,
        }
    }
}

/// Map translated candidates onto renderable cards. Rendering into export
/// byte formats belongs to the storage/export adapters, not this crate.
pub fn assemble_cards(selection: &[Candidate], req: &BuildRequest) -> Vec<Card> {
    selection
        .iter()
        .map(|candidate| {
            let sentence = candidate.source_sentence.clone();
            let id = Card::make_id(&[
                &candidate.lemma,
                sentence.as_deref().unwrap_or_default(),
                &candidate.pos,
                BUILD_VERSION,
            ]);
            Card {
                id,
                lemma: candidate.lemma.clone(),
                prompt: candidate.lemma.clone(),
                answer: candidate.translated_word.clone().unwrap_or_default(),
                sentence,
                sentence_translation: candidate.translated_sentence.clone(),
                pos: Some(candidate.pos.clone()),
                source_lang_tag: candidate.source_lang_tag.clone(),
                target_lang_tag: candidate.target_lang_tag.clone(),
                build_version: req.build_version.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::tests::request;

    fn candidate() -> Candidate {
        Candidate {
            lemma: "gå".to_string(),
            pos: "VERB".to_string(),
            forms: vec!["går".to_string()],
            freq: 10,
            cov_share: 0.05,
            score: Some(0.05),
            source_form: Some("går".to_string()),
            source_sentence: Some("Jag går hem.".to_string()),
            translated_word: Some("walk".to_string()),
            translated_sentence: Some("I <i>walk</i> home.".to_string()),
            source_lang_tag: "sv".to_string(),
            target_lang_tag: "en-GB".to_string(),
        }
    }

    #[test]
    fn cards_map_candidate_fields() {
        let req = request();
        let cards = assemble_cards(&[candidate()], &req);
        assert_eq!(cards.len(), 1);
        let card = &cards[0];
        assert_eq!(card.prompt, "gå");
        assert_eq!(card.answer, "walk");
        assert_eq!(card.sentence.as_deref(), Some("Jag går hem."));
        assert_eq!(card.id.len(), 16);
    }

    #[test]
    fn card_ids_are_stable_for_identical_content() {
        let req = request();
        let a = assemble_cards(&[candidate()], &req);
        let b = assemble_cards(&[candidate()], &req);
        assert_eq!(a[0].id, b[0].id);
    }

    #[test]
    fn deck_stats_count_unique_lemmas() {
        let req = request();
        let cards = assemble_cards(&[candidate(), candidate()], &req);
        let deck = Deck::build(&req, &cards, 0.82);
        assert_eq!(deck.card_count, 2);
        assert_eq!(deck.unique_lemmas, 1);
        assert_eq!(deck.achieved_coverage, 0.82);
        assert_eq!(deck.idempotency_key.len(), 64);
    }

    #[test]
    fn idempotency_key_tracks_the_request_knobs() {
        let req = request();
        let mut changed = request();
        changed.max_cards = Some(50);
        let cards: Vec<Card> = vec![];
        assert_ne!(
            Deck::build(&req, &cards, 0.0).idempotency_key,
            Deck::build(&changed, &cards, 0.0).idempotency_key
        );
    }
}
