use tracing::info;

use crate::candidates::{score_and_rank, select_candidates, select_examples, Candidate};
use crate::cards::{assemble_cards, Card, Deck};
use crate::config::Config;
use crate::error::Result;
use crate::lexicon::LexiconSnapshot;
use crate::picker::{pick_until_target, PickReport};
use crate::ports::CacheStore;
use crate::request::BuildRequest;
use crate::translate::{
    BatchTranslator, Backoff, FixedBackoff, TranslationOutcome, TranslationProvider,
};

/// Everything one build produces: renderable cards, deck metadata, the
/// allocation report and the translation triage list.
#[derive(Debug, Clone)]
pub struct DeckBuild {
    pub deck: Deck,
    pub cards: Vec<Card>,
    pub report: PickReport,
    pub not_correctly_translated: Vec<Candidate>,
}

/// Orchestrates one build request through the pipeline stages:
/// snapshot -> candidates -> ranking -> picking -> examples -> translation
/// -> cards. Collaborators are injected at construction; the pipeline owns
/// no global state and one instance serves one request at a time.
pub struct DeckPipeline {
    config: Config,
    provider: Box<dyn TranslationProvider>,
    cache: Box<dyn CacheStore>,
    backoff: Box<dyn Backoff>,
}

impl DeckPipeline {
    pub fn new(
        config: Config,
        provider: Box<dyn TranslationProvider>,
        cache: Box<dyn CacheStore>,
    ) -> Self {
        let backoff = Box::new(FixedBackoff::from_secs(
            config.translate.rate_limit_backoff_secs,
        ));
        Self {
            config,
            provider,
            cache,
            backoff,
        }
    }

    /// Replace the rate-limit backoff, mainly for deterministic tests.
    pub fn with_backoff(mut self, backoff: Box<dyn Backoff>) -> Self {
        self.backoff = backoff;
        self
    }

    /// Select, rank and pick candidates, then attach one example pair to
    /// every pick. Fails without touching the translation layer when the
    /// request is invalid or an example is missing.
    pub fn build_selection(
        &self,
        snapshot: &LexiconSnapshot,
        req: &BuildRequest,
    ) -> Result<(Vec<Candidate>, PickReport)> {
        req.validate()?;

        let candidates = select_candidates(snapshot, req);
        let ranked = score_and_rank(candidates);
        let (mut picked, report) = pick_until_target(ranked, req, &self.config.picker)?;
        select_examples(&mut picked, snapshot, req)?;

        info!(
            "Selection complete: {} picked, coverage {:.4} ({:?})",
            report.picked_count, report.achieved_coverage, report.stopped_reason
        );
        Ok((picked, report))
    }

    /// Translate a picked selection through the cache and the provider.
    pub async fn translate_selection(
        &self,
        selection: Vec<Candidate>,
    ) -> Result<TranslationOutcome> {
        let translator = BatchTranslator::new(
            self.provider.as_ref(),
            self.cache.as_ref(),
            self.backoff.as_ref(),
            &self.config.translate,
        );
        translator.translate_selection(selection).await
    }

    /// Run the full pipeline for one request.
    pub async fn build(&self, snapshot: &LexiconSnapshot, req: &BuildRequest) -> Result<DeckBuild> {
        let (selection, report) = self.build_selection(snapshot, req)?;
        let outcome = self.translate_selection(selection).await?;

        let cards = assemble_cards(&outcome.translated, req);
        let deck = Deck::build(req, &cards, report.achieved_coverage);

        info!(
            "Deck '{}' built with {} cards ({} flagged for review)",
            deck.deck_name,
            deck.card_count,
            outcome.not_correctly_translated.len()
        );
        Ok(DeckBuild {
            deck,
            cards,
            report,
            not_correctly_translated: outcome.not_correctly_translated,
        })
    }
}
