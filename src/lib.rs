// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analysis;
pub mod api;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod serve;
pub mod store;
pub mod temporal;
pub mod tokens;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::bootstrap::{Collaborators, Services};
pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use crate::config::AppConfig;
pub use crate::error::{EnrichError, FetchError, StoreError, TemporalError};
pub use crate::ingest::types::{NewsArticle, NewsSource};
