//! # Threadwise
//!
//! Cached, fault-tolerant LLM summaries of forum threads.
//!
//! ## Features
//!
//! - **Structured Intelligence**: Returns typed `SummaryData` with bullets, key points, contributors, sentiment and a health score
//! - **One Entry Per Thread**: In-memory cache keyed by thread and last activity; new posts supersede old summaries
//! - **Never Fails Loudly**: Failures are classified into user-facing errors, retried when worthwhile, and backed by statistical fallbacks
//! - **Latency SLOs**: Every request is timed; cached responses should beat 100ms, generated ones 3s

pub mod agent;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod forum;
pub mod generator;
pub mod logging;
pub mod monitor;
pub mod pipeline;
pub mod summary;

pub use agent::{GeminiGenerator, GenerationRequest, StructuredGenerator};
pub use cache::{generate_cache_key, parse_cache_key, CacheManager};
pub use classifier::{ErrorCategory, ErrorClassifier, UserFriendlyError};
pub use config::Config;
pub use forum::{Post, Thread};
pub use generator::SummaryGenerator;
pub use monitor::PerformanceMonitor;
pub use pipeline::{SummaryPipeline, SummaryResponse};
pub use summary::{SummaryData, SummaryResult};
