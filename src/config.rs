use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, DeckError};
use crate::versions::TRANSLATION_ENGINE_VERSION;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub picker: PickerConfig,
    pub translate: TranslateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickerConfig {
    /// Minimum "need" magnitude before the allocator steers toward an
    /// under-represented POS. Prevents oscillation near target boundaries.
    pub hysteresis_eps: f64,
    /// Relative score gap above which the global best head wins over the
    /// head of the most-needed POS.
    pub score_gap_delta: f64,
    /// Additive smoothing constant for the per-POS share estimate.
    pub smoothing_alpha: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Engine configuration version baked into every cache id.
    pub engine_version: String,
    /// Candidates per cache-store lookup round-trip.
    pub cache_lookup_batch: usize,
    /// Sentences per bulk translation call.
    pub translate_batch: usize,
    /// Fixed backoff after a rate-limit signal, in seconds.
    pub rate_limit_backoff_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            picker: PickerConfig {
                hysteresis_eps: 0.02,
                score_gap_delta: 0.15,
                smoothing_alpha: 1.0,
            },
            translate: TranslateConfig {
                engine_version: TRANSLATION_ENGINE_VERSION.to_string(),
                cache_lookup_batch: 100,
                translate_batch: 40,
                rate_limit_backoff_secs: 3,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeckError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| DeckError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DeckError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| DeckError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
