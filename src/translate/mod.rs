// Batched translation workflow
//
// This module drives the abstract translation capability in bounded rounds:
// - cache: canonicalization and content-addressed cache ids
// - batch: cache lookup, bulk translation and upsert, round by round

pub mod batch;
pub mod cache;

use async_trait::async_trait;
use std::time::Duration;

pub use batch::BatchTranslator;
pub use cache::{cache_id, CacheEntry};

use crate::candidates::Candidate;
use crate::error::Result;

/// Abstract bulk translation capability. Implementations signal provider
/// rate limiting with `DeckError::RateLimited`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Translate a batch of sentences between the given language tags.
    /// Must return exactly one result per input sentence, in order.
    async fn translate(
        &self,
        sentences: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>>;
}

/// Pause taken between a rate-limit signal and the single retry. Injected
/// so tests can run without wall-clock sleeps.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backoff: Send + Sync {
    async fn pause(&self);
}

/// Fixed-delay backoff on the tokio timer.
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }
}

#[async_trait]
impl Backoff for FixedBackoff {
    async fn pause(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

/// Result of one translation run: every attempted candidate, plus the side
/// list of items whose translation could not be validated.
#[derive(Debug, Clone, Default)]
pub struct TranslationOutcome {
    pub translated: Vec<Candidate>,
    pub not_correctly_translated: Vec<Candidate>,
}
