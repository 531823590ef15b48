//! Version constants threaded through cache ids and deck metadata.
//!
//! ENGINE_VERSION changes when the translation provider/model/settings
//! change; it is baked into every cache id so stale rows stop matching
//! without being deleted. BUILD_VERSION changes when selection/ranking
//! rules change and feeds deck idempotency keys and card ids.

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Content-selection logic version.
pub const BUILD_VERSION: &str = "2026-08.b1";

/// External MT engine configuration version.
pub const TRANSLATION_ENGINE_VERSION: &str = "MT:2026-08";

/// Request/response knobs shape.
pub const PARAMS_SCHEMA_VERSION: &str = "v1";
