//! Request timing and latency SLO tracking.

use crate::config::MonitorConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Timing record for one summary request
#[derive(Debug, Clone)]
pub struct PerformanceMetric {
    pub request_id: String,
    pub thread_id: String,
    pub started_at: DateTime<Utc>,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub cache_hit: bool,
    pub cache_key: Option<String>,
    pub error: Option<String>,
}

impl PerformanceMetric {
    /// Elapsed time, once the request has completed
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end.duration_since(self.start_time))
    }
}

/// Aggregates over the retained, completed requests. Times are milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub total_requests: usize,
    pub cached_requests: usize,
    pub uncached_requests: usize,
    pub average_response_time: f64,
    pub average_cached_response_time: f64,
    pub average_uncached_response_time: f64,
    pub cache_hit_rate: f64,
    pub error_rate: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
}

struct MonitorState {
    history: VecDeque<PerformanceMetric>,
    sequence: u64,
}

pub struct PerformanceMonitor {
    state: Mutex<MonitorState>,
    history_size: usize,
    cached_slo: Duration,
    uncached_slo: Duration,
}

impl PerformanceMonitor {
    pub fn new(config: &MonitorConfig) -> Self {
        let history_size = config.history_size.max(1);
        Self {
            state: Mutex::new(MonitorState {
                history: VecDeque::with_capacity(history_size),
                sequence: 0,
            }),
            history_size,
            cached_slo: Duration::from_millis(config.cached_slo_ms),
            uncached_slo: Duration::from_millis(config.uncached_slo_ms),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin timing a request and return its id
    pub fn start_request(&self, thread_id: &str) -> String {
        let mut state = self.lock();
        state.sequence += 1;
        let uuid = Uuid::new_v4().simple().to_string();
        let request_id = format!("req_{}_{}", state.sequence, &uuid[..8]);

        if state.history.len() >= self.history_size {
            state.history.pop_front();
        }
        state.history.push_back(PerformanceMetric {
            request_id: request_id.clone(),
            thread_id: thread_id.to_string(),
            started_at: Utc::now(),
            start_time: Instant::now(),
            end_time: None,
            cache_hit: false,
            cache_key: None,
            error: None,
        });
        request_id
    }

    pub fn mark_cache_hit(&self, request_id: &str, cache_key: &str) {
        let mut state = self.lock();
        if let Some(metric) = find_mut(&mut state.history, request_id) {
            metric.cache_hit = true;
            metric.cache_key = Some(cache_key.to_string());
        }
    }

    /// Finish timing a request.
    ///
    /// Returns `None` when the id is unknown, e.g. already dropped from history.
    pub fn complete_request(&self, request_id: &str, error: Option<&str>) -> Option<PerformanceMetric> {
        let metric = {
            let mut state = self.lock();
            let metric = find_mut(&mut state.history, request_id)?;
            metric.end_time = Some(Instant::now());
            metric.error = error.map(str::to_string);
            metric.clone()
        };

        let elapsed = metric.duration().unwrap_or_default();
        if self.exceeds_slo(&metric, elapsed) {
            let (kind, slo) = if metric.cache_hit {
                ("Cached", self.cached_slo)
            } else {
                ("Uncached", self.uncached_slo)
            };
            tracing::warn!(
                request_id,
                thread_id = %metric.thread_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "{} summary response exceeded {}ms",
                kind,
                slo.as_millis()
            );
        }
        Some(metric)
    }

    pub fn stats(&self) -> PerformanceStats {
        let state = self.lock();
        let completed: Vec<(&PerformanceMetric, f64)> = state
            .history
            .iter()
            .filter_map(|m| m.duration().map(|d| (m, d.as_secs_f64() * 1000.0)))
            .collect();
        if completed.is_empty() {
            return PerformanceStats::default();
        }

        let total = completed.len();
        let cached: Vec<f64> = completed.iter().filter(|(m, _)| m.cache_hit).map(|(_, t)| *t).collect();
        let uncached: Vec<f64> = completed.iter().filter(|(m, _)| !m.cache_hit).map(|(_, t)| *t).collect();
        let errors = completed.iter().filter(|(m, _)| m.error.is_some()).count();

        let mut all: Vec<f64> = completed.iter().map(|(_, t)| *t).collect();
        all.sort_by(|a, b| a.total_cmp(b));

        PerformanceStats {
            total_requests: total,
            cached_requests: cached.len(),
            uncached_requests: uncached.len(),
            average_response_time: mean(&all),
            average_cached_response_time: mean(&cached),
            average_uncached_response_time: mean(&uncached),
            cache_hit_rate: cached.len() as f64 / total as f64,
            error_rate: errors as f64 / total as f64,
            p95_response_time: percentile(&all, 95.0),
            p99_response_time: percentile(&all, 99.0),
        }
    }

    /// The most recent `n` metrics, oldest first
    pub fn recent(&self, n: usize) -> Vec<PerformanceMetric> {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn reset(&self) {
        self.lock().history.clear();
    }

    /// A response landing exactly on its target is slow but not a violation
    fn exceeds_slo(&self, metric: &PerformanceMetric, elapsed: Duration) -> bool {
        if metric.cache_hit {
            elapsed > self.cached_slo
        } else {
            elapsed > self.uncached_slo
        }
    }

    pub fn is_cached_response_fast(&self, elapsed: Duration) -> bool {
        elapsed < self.cached_slo
    }

    pub fn is_uncached_response_fast(&self, elapsed: Duration) -> bool {
        elapsed < self.uncached_slo
    }
}

fn find_mut<'a>(
    history: &'a mut VecDeque<PerformanceMetric>,
    request_id: &str,
) -> Option<&'a mut PerformanceMetric> {
    // recent requests are at the back
    history.iter_mut().rev().find(|m| m.request_id == request_id)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Nearest-rank percentile of an ascending slice
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
