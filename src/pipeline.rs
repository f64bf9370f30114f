//! The summary request pipeline.
//!
//! One request moves through: cache lookup, then on a miss a bounded series
//! of generation attempts with backoff between retryable failures, then
//! caching of a generated summary. Every path ends in a [`SummaryResponse`];
//! failures carry a classified error and a statistical fallback.

use crate::agent::StructuredGenerator;
use crate::cache::{generate_cache_key, CacheManager};
use crate::classifier::{ErrorClassifier, UserFriendlyError};
use crate::config::{Config, PipelineConfig};
use crate::forum::{Post, Thread};
use crate::generator::{statistical_fallback, SummaryGenerator};
use crate::monitor::PerformanceMonitor;
use crate::summary::{SummaryData, SummaryResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What the request handler returns to the client
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SummaryData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UserFriendlyError>,
    pub fallback: bool,
    pub cached: bool,
    pub generated_at: DateTime<Utc>,
    pub request_id: String,
}

impl SummaryResponse {
    fn from_result(result: SummaryResult, request_id: &str) -> Self {
        Self {
            success: result.success,
            data: result.data,
            error: result.error,
            fallback: result.fallback,
            cached: false,
            generated_at: Utc::now(),
            request_id: request_id.to_string(),
        }
    }
}

/// Tagged result of one generation attempt
enum Attempt {
    Success(SummaryResult),
    RetryableFailure(SummaryResult, Duration),
    TerminalFailure(SummaryResult),
}

pub struct SummaryPipeline {
    cache: Arc<CacheManager>,
    monitor: Arc<PerformanceMonitor>,
    classifier: Arc<ErrorClassifier>,
    generator: SummaryGenerator,
    config: PipelineConfig,
}

impl SummaryPipeline {
    pub fn new(
        cache: Arc<CacheManager>,
        monitor: Arc<PerformanceMonitor>,
        classifier: Arc<ErrorClassifier>,
        generator: SummaryGenerator,
        config: PipelineConfig,
    ) -> Self {
        Self {
            cache,
            monitor,
            classifier,
            generator,
            config,
        }
    }

    /// Wire up all components from configuration around a generation backend
    pub fn from_config(config: &Config, backend: Arc<dyn StructuredGenerator>) -> Self {
        let classifier = Arc::new(ErrorClassifier::new());
        let generator = SummaryGenerator::new(backend, Arc::clone(&classifier))
            .with_persona(config.agent.persona.clone())
            .with_timeout(config.pipeline.generation_timeout());
        Self::new(
            Arc::new(CacheManager::new(&config.cache)),
            Arc::new(PerformanceMonitor::new(&config.monitor)),
            classifier,
            generator,
            config.pipeline.clone(),
        )
    }

    /// Start background maintenance. Must be called inside a tokio runtime.
    pub fn start(&self) {
        self.cache.start_sweeper();
        tracing::debug!("Summary pipeline started");
    }

    /// Stop background maintenance and wait for it to finish
    pub async fn shutdown(&self) {
        self.cache.stop_sweeper().await;
        tracing::debug!("Summary pipeline stopped");
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub async fn request_summary(
        &self,
        thread_id: &str,
        last_post_timestamp: &str,
        thread: &Thread,
        posts: &[Post],
    ) -> SummaryResponse {
        self.request_summary_with_cancel(
            thread_id,
            last_post_timestamp,
            thread,
            posts,
            &CancellationToken::new(),
        )
        .await
    }

    /// Serve a summary, abandoning generation if `cancel` fires
    pub async fn request_summary_with_cancel(
        &self,
        thread_id: &str,
        last_post_timestamp: &str,
        thread: &Thread,
        posts: &[Post],
        cancel: &CancellationToken,
    ) -> SummaryResponse {
        let request_id = self.monitor.start_request(thread_id);
        let response = self
            .respond(&request_id, thread_id, last_post_timestamp, thread, posts, cancel)
            .await;

        let error = response
            .error
            .as_ref()
            .map(|e| e.technical_details.clone().unwrap_or_else(|| e.title.clone()));
        self.monitor.complete_request(&request_id, error.as_deref());
        response
    }

    async fn respond(
        &self,
        request_id: &str,
        thread_id: &str,
        last_post_timestamp: &str,
        thread: &Thread,
        posts: &[Post],
        cancel: &CancellationToken,
    ) -> SummaryResponse {
        match self.cache.get(thread_id, last_post_timestamp) {
            Ok(Some(entry)) => {
                let key = generate_cache_key(thread_id, last_post_timestamp)
                    .map(|k| k.to_string())
                    .unwrap_or_default();
                self.monitor.mark_cache_hit(request_id, &key);
                tracing::debug!(request_id, thread_id, "Serving cached summary");
                return SummaryResponse {
                    success: true,
                    data: Some(entry.data),
                    error: None,
                    fallback: false,
                    cached: true,
                    generated_at: entry.generated_at,
                    request_id: request_id.to_string(),
                };
            }
            Ok(None) => {}
            Err(e) => {
                let error = self.classifier.classify_error(&e, None);
                tracing::warn!(request_id, "Rejected summary request: {}", e);
                let result = SummaryResult::failed(error, statistical_fallback(thread, posts));
                return SummaryResponse::from_result(result, request_id);
            }
        }

        let attempts = cancel.child_token();
        let budget = self.config.request_timeout();
        let result = match tokio::time::timeout(
            budget,
            self.generate_with_retry(thread, posts, &attempts, Instant::now() + budget),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                attempts.cancel();
                let message = format!("summary request timed out after {}s", budget.as_secs());
                tracing::warn!(request_id, thread_id, "{}", message);
                SummaryResult::failed(
                    self.classifier.classify(&message, None),
                    statistical_fallback(thread, posts),
                )
            }
        };

        // deterministic edge-case summaries are cheap to rebuild and not cached
        if result.success && !result.fallback {
            if let Some(data) = &result.data {
                match self
                    .cache
                    .set_unless_superseded(thread_id, last_post_timestamp, data.clone())
                {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(request_id, thread_id, "Skipped caching superseded summary")
                    }
                    Err(e) => tracing::warn!(request_id, "Failed to cache summary: {}", e),
                }
            }
        }

        if let Some(error) = &result.error {
            tracing::error!(
                request_id,
                thread_id,
                category = %error.category,
                "Summary request failed, returning fallback"
            );
        }
        SummaryResponse::from_result(result, request_id)
    }

    /// Run generation attempts one after another until success, a terminal
    /// failure, the attempt ceiling or the deadline
    async fn generate_with_retry(
        &self,
        thread: &Thread,
        posts: &[Post],
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> SummaryResult {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = self.generator.generate_with_cancel(thread, posts, cancel).await;
            if cancel.is_cancelled() {
                return result;
            }

            let (result, delay) = match self.assess(result) {
                Attempt::Success(result) | Attempt::TerminalFailure(result) => return result,
                Attempt::RetryableFailure(result, _) if attempt >= max_attempts => {
                    tracing::warn!(thread_id = %thread.id, attempt, "Retry attempts exhausted");
                    return result;
                }
                Attempt::RetryableFailure(result, delay) => (result, delay),
            };

            let resume_at = Instant::now().checked_add(delay);
            if resume_at.map_or(true, |at| at >= deadline) {
                tracing::warn!(
                    thread_id = %thread.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Backoff would exceed request deadline, giving up"
                );
                return result;
            }

            tracing::info!(
                thread_id = %thread.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying summary generation"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    let error = self.classifier.classify("summary request cancelled", None);
                    return SummaryResult::failed(error, statistical_fallback(thread, posts));
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn assess(&self, result: SummaryResult) -> Attempt {
        if result.success {
            return Attempt::Success(result);
        }
        match &result.error {
            Some(error) if self.classifier.is_retryable(error) => {
                let delay = self.classifier.retry_delay(error);
                Attempt::RetryableFailure(result, delay)
            }
            _ => Attempt::TerminalFailure(result),
        }
    }
}
