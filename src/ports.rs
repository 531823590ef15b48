use async_trait::async_trait;
use std::collections::HashMap;

#[cfg(test)]
use mockall::automock;

use crate::cards::{Card, Deck};
use crate::error::Result;
use crate::translate::cache::CacheEntry;

/// A cached translation row, keyed by cache id in lookup responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTranslation {
    pub translated_word: String,
    pub translated_sentence: String,
}

/// Shared, externally-owned translation cache. Rows are content-addressed,
/// so concurrent writers racing on the same canonical input converge on the
/// same row and the upsert is effectively a no-op.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch cached translations for the given ids; absent ids are simply
    /// missing from the returned map.
    async fn get_cached(&self, ids: &[String]) -> Result<HashMap<String, CachedTranslation>>;

    /// Insert-or-replace cache rows keyed by their deterministic id.
    async fn upsert_cache_translation(&self, entries: &[CacheEntry]) -> Result<()>;
}

/// Persistence surface for assembled decks. Implemented by a storage
/// adapter per backend; the core never touches bytes or routes itself.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeckStore: Send + Sync {
    async fn save_deck(&self, deck: &Deck) -> Result<()>;

    async fn save_cards(&self, cards: &[Card], deck_id: &str) -> Result<()>;
}
