//! Summary generation: edge cases, input shaping, the model call, response
//! validation and statistical fallbacks.
//!
//! [`SummaryGenerator::generate`] never fails. Whatever happens upstream the
//! caller receives a [`SummaryResult`] with renderable data. The generator
//! only describes threads; it has no access to any moderation capability.

use crate::agent::{AgentError, GenerationRequest, StructuredGenerator};
use crate::classifier::ErrorClassifier;
use crate::forum::{Post, Thread};
use crate::summary::{
    response_schema, Contributor, Sentiment, SummaryData, SummaryResult, MAX_CONTRIBUTORS,
    MAX_KEY_POINTS, MAX_SUMMARY_ITEMS,
};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Threads with less trimmed text than this are not sent to the model
pub const MIN_CONTENT_LENGTH: usize = 50;
/// Threads with more posts than this are sampled
pub const SAMPLE_THRESHOLD: usize = 20;
/// Default bound on a single generation call
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

const EDGE_POSTS: usize = 3;
const MAX_MIDDLE_POSTS: usize = 14;
const SUBSTANTIVE_POST_LENGTH: usize = 50;
const MAX_POST_CHARS: usize = 2000;

/// Context passed to the classifier for generation failures
const CLASSIFY_CONTEXT: &str = "thread summary";

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("summary generation timed out after {0}s")]
    Timeout(u64),
    #[error("summary generation was cancelled")]
    Cancelled,
    #[error("invalid summary format: {0}")]
    InvalidFormat(String),
}

pub struct SummaryGenerator {
    backend: Arc<dyn StructuredGenerator>,
    classifier: Arc<ErrorClassifier>,
    persona: String,
    timeout: Duration,
}

impl SummaryGenerator {
    pub fn new(backend: Arc<dyn StructuredGenerator>, classifier: Arc<ErrorClassifier>) -> Self {
        Self {
            backend,
            classifier,
            persona: crate::config::AgentConfig::default().persona,
            timeout: GENERATION_TIMEOUT,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn generate(&self, thread: &Thread, posts: &[Post]) -> SummaryResult {
        self.generate_with_cancel(thread, posts, &CancellationToken::new())
            .await
    }

    /// Summarize a thread, giving up early if `cancel` fires
    pub async fn generate_with_cancel(
        &self,
        thread: &Thread,
        posts: &[Post],
        cancel: &CancellationToken,
    ) -> SummaryResult {
        if posts.is_empty() {
            tracing::debug!(thread_id = %thread.id, "No posts, skipping generation");
            return SummaryResult::deterministic(empty_thread_summary(thread));
        }
        if content_length(thread, posts) < MIN_CONTENT_LENGTH {
            tracing::debug!(thread_id = %thread.id, "Minimal content, skipping generation");
            return SummaryResult::deterministic(minimal_content_summary(thread, posts));
        }

        let sampled = sample_posts(posts);
        tracing::info!(
            thread_id = %thread.id,
            posts = posts.len(),
            sampled = sampled.len(),
            "Generating thread summary"
        );

        let request = GenerationRequest {
            system: self.persona.clone(),
            prompt: build_prompt(thread, &sampled, posts.len()),
            schema: response_schema(),
        };

        let outcome = match self.call(&request, cancel).await {
            Ok(value) => validate_response(&value),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(data) => SummaryResult::generated(data),
            Err(e) => {
                let error = self.classifier.classify_error(&e, Some(CLASSIFY_CONTEXT));
                tracing::warn!(
                    thread_id = %thread.id,
                    category = %error.category,
                    "Summary generation failed, using fallback: {}",
                    e
                );
                SummaryResult::failed(error, statistical_fallback(thread, posts))
            }
        }
    }

    async fn call(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, GenerationError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, self.backend.generate(request)) => {
                match outcome {
                    Ok(result) => result.map_err(GenerationError::from),
                    Err(_) => Err(GenerationError::Timeout(self.timeout.as_secs())),
                }
            }
        }
    }
}

/// Total trimmed characters across the opening post and all replies
pub fn content_length(thread: &Thread, posts: &[Post]) -> usize {
    thread.body.trim().chars().count()
        + posts
            .iter()
            .map(|p| p.body.trim().chars().count())
            .sum::<usize>()
}

/// Pick the posts sent to the model.
///
/// Up to [`SAMPLE_THRESHOLD`] posts are used as-is. Longer threads keep the
/// first and last three posts plus the longest substantive posts from the
/// middle, returned in chronological order without duplicates.
pub fn sample_posts(posts: &[Post]) -> Vec<&Post> {
    if posts.len() <= SAMPLE_THRESHOLD {
        return posts.iter().collect();
    }

    let n = posts.len();
    let body_len = |i: usize| posts[i].body.trim().chars().count();

    let mut chosen: Vec<usize> = (0..EDGE_POSTS).chain(n - EDGE_POSTS..n).collect();
    let mut middle: Vec<usize> = (EDGE_POSTS..n - EDGE_POSTS)
        .filter(|&i| body_len(i) > SUBSTANTIVE_POST_LENGTH)
        .collect();
    middle.sort_by(|&a, &b| body_len(b).cmp(&body_len(a)).then(a.cmp(&b)));
    chosen.extend(middle.into_iter().take(MAX_MIDDLE_POSTS));

    chosen.sort_by_key(|&i| (posts[i].created_at, i));
    let mut seen = HashSet::new();
    chosen
        .into_iter()
        .filter(|&i| seen.insert(posts[i].id.as_str()))
        .map(|i| &posts[i])
        .collect()
}

fn build_prompt(thread: &Thread, posts: &[&Post], total_posts: usize) -> String {
    let mut prompt = format!(
        "Thread: \"{}\"\nStarted by {} on {}\n\nOpening post:\n{}\n\n",
        thread.title,
        thread.author.username,
        thread.created_at.format("%Y-%m-%d %H:%M"),
        truncate_chars(thread.body.trim(), MAX_POST_CHARS),
    );

    if posts.len() < total_posts {
        prompt.push_str(&format!(
            "Replies ({} of {} shown, selected for coverage):\n",
            posts.len(),
            total_posts
        ));
    } else {
        prompt.push_str(&format!("Replies ({}):\n", total_posts));
    }
    for (idx, post) in posts.iter().enumerate() {
        prompt.push_str(&format!(
            "[{}] {} ({}): {}\n",
            idx + 1,
            post.username(),
            post.created_at.format("%Y-%m-%d %H:%M"),
            truncate_chars(post.body.trim(), MAX_POST_CHARS),
        ));
    }

    prompt.push_str(
        "\nAnalyze this discussion. Provide up to 5 summary bullets, 3-5 key viewpoints, \
         the 2-4 most influential contributors with what each contributed, the overall \
         sentiment (Positive, Neutral, Mixed or Negative) and a health score from 1 \
         (hostile, unproductive) to 10 (respectful, constructive). Describe the discussion \
         only; do not recommend actions against participants.",
    );
    prompt
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Check a model response against the summary schema.
///
/// Over-long lists are cut to their maximum; any other deviation is an
/// [`GenerationError::InvalidFormat`]. The health label is always derived.
pub fn validate_response(value: &Value) -> Result<SummaryData, GenerationError> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid("expected a JSON object"))?;

    let mut summary = string_list(obj, "summary")?;
    summary.truncate(MAX_SUMMARY_ITEMS);

    let mut key_points = string_list(obj, "keyPoints")?;
    key_points.truncate(MAX_KEY_POINTS);

    let mut contributors = contributor_list(obj)?;
    contributors.truncate(MAX_CONTRIBUTORS);

    let sentiment = match obj.get("sentiment") {
        None => return Err(invalid("missing required field sentiment")),
        Some(Value::String(s)) => Sentiment::from_generated(s).ok_or_else(|| {
            tracing::debug!(sentiment = %s, "Rejected sentiment");
            invalid("sentiment must be one of Positive, Neutral, Mixed, Negative")
        })?,
        Some(_) => return Err(invalid("sentiment must be a string")),
    };

    let health_score = match obj.get("healthScore") {
        None => return Err(invalid("missing required field healthScore")),
        Some(v) => integer(v).ok_or_else(|| invalid("healthScore must be an integer"))?,
    };
    if !(1..=10).contains(&health_score) {
        return Err(invalid("healthScore must be between 1 and 10"));
    }

    Ok(SummaryData::new(
        summary,
        key_points,
        contributors,
        sentiment,
        health_score as u8,
    ))
}

fn invalid(reason: &str) -> GenerationError {
    GenerationError::InvalidFormat(reason.to_string())
}

fn string_list(obj: &Map<String, Value>, field: &str) -> Result<Vec<String>, GenerationError> {
    let items = match obj.get(field) {
        None => return Err(invalid(&format!("missing required field {}", field))),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(invalid(&format!("{} must be an array", field))),
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(&format!("{} must contain only strings", field)))
        })
        .collect()
}

fn contributor_list(obj: &Map<String, Value>) -> Result<Vec<Contributor>, GenerationError> {
    let items = match obj.get("contributors") {
        None => return Err(invalid("missing required field contributors")),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(invalid("contributors must be an array")),
    };
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let field = |name: &str| {
                item.get(name)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        invalid(&format!("contributors[{}].{} must be a non-empty string", idx, name))
                    })
            };
            Ok(Contributor::new(field("username")?, field("contribution")?))
        })
        .collect()
}

fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Post counts per username, in order of first appearance
fn poster_counts(posts: &[Post]) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for post in posts {
        let name = post.username();
        let count = counts.entry(name.clone()).or_insert(0);
        if *count == 0 {
            order.push(name);
        }
        *count += 1;
    }
    order
        .into_iter()
        .map(|name| {
            let count = counts.get(&name).copied().unwrap_or_default();
            (name, count)
        })
        .collect()
}

fn top_posters(posts: &[Post], limit: usize) -> Vec<Contributor> {
    let mut counts = poster_counts(posts);
    // stable sort keeps first-appearance order among ties
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .take(limit)
        .map(|(name, count)| {
            Contributor::new(name, format!("Posted {}", plural(count, "reply", "replies")))
        })
        .collect()
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("{} {}", count, one)
    } else {
        format!("{} {}", count, many)
    }
}

fn empty_thread_summary(thread: &Thread) -> SummaryData {
    SummaryData::new(
        vec!["This thread has no posts yet.".to_string()],
        vec![
            format!("\"{}\" was started by {}", thread.title, thread.author.username),
            "Waiting for the first reply".to_string(),
        ],
        vec![Contributor::new(
            thread.author.username.clone(),
            "Started the thread",
        )],
        Sentiment::NoDiscussion,
        0,
    )
}

fn minimal_content_summary(thread: &Thread, posts: &[Post]) -> SummaryData {
    SummaryData::new(
        vec![
            "This thread has very little content to analyze.".to_string(),
            format!(
                "{} so far, mostly short messages.",
                plural(posts.len(), "post", "posts")
            ),
        ],
        vec![
            format!("\"{}\" was started by {}", thread.title, thread.author.username),
            "Not enough discussion for a detailed analysis".to_string(),
        ],
        top_posters(posts, 2),
        Sentiment::Neutral,
        6,
    )
}

/// Overview computed from the posts alone, used when generation fails
pub fn statistical_fallback(thread: &Thread, posts: &[Post]) -> SummaryData {
    let participants = poster_counts(posts).len();
    SummaryData::new(
        vec![
            format!(
                "This thread has {} from {}.",
                plural(posts.len(), "post", "posts"),
                plural(participants, "participant", "participants")
            ),
            "A detailed AI summary is not available right now.".to_string(),
        ],
        vec![
            format!("{} in the discussion", plural(posts.len(), "post", "posts")),
            format!(
                "{} taking part",
                plural(participants, "unique contributor", "unique contributors")
            ),
            format!("Started by {}", thread.author.username),
        ],
        top_posters(posts, 2),
        Sentiment::Neutral,
        5,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ErrorCategory;
    use crate::forum::fixtures::{post, thread};
    use crate::summary::HealthLabel;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned responses and records every request it sees
    struct Scripted {
        responses: Mutex<Vec<Result<Value, String>>>,
        requests: Mutex<Vec<GenerationRequest>>,
        delay: Option<Duration>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Value, String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
                delay: None,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(vec![Ok(valid_response(8))]),
                requests: Mutex::new(Vec::new()),
                delay: Some(delay),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl StructuredGenerator for Scripted {
        async fn generate(&self, request: &GenerationRequest) -> Result<Value, AgentError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.responses.lock().unwrap().remove(0);
            next.map_err(AgentError::RequestFailed)
        }
    }

    fn valid_response(score: u8) -> Value {
        json!({
            "summary": ["Team debates moving to Bazel", "Concerns about migration cost"],
            "keyPoints": ["Build times are slow", "Bazel has a learning curve", "Incremental adoption proposed"],
            "contributors": [
                {"username": "bob", "contribution": "Benchmarked current builds"},
                {"username": "carol", "contribution": "Raised tooling concerns"}
            ],
            "sentiment": "Mixed",
            "healthScore": score
        })
    }

    fn generator(backend: Arc<Scripted>) -> SummaryGenerator {
        SummaryGenerator::new(backend, Arc::new(ErrorClassifier::new()))
    }

    fn long_body(seed: usize) -> String {
        format!(
            "Post {} with enough detail to count as a substantive contribution to the thread.",
            seed
        )
    }

    fn discussion(count: usize) -> Vec<Post> {
        (0..count)
            .map(|i| post(i, if i % 3 == 0 { "bob" } else { "carol" }, &long_body(i)))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_thread_skips_generation() {
        let backend = Scripted::new(vec![]);
        let result = generator(backend.clone()).generate(&thread("Hello"), &[]).await;

        assert!(result.success);
        assert!(result.fallback);
        let data = result.data.unwrap();
        assert_eq!(data.health_score(), 0);
        assert_eq!(data.health_label(), HealthLabel::NewThread);
        assert_eq!(data.sentiment, Sentiment::NoDiscussion);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_minimal_content_skips_generation() {
        let backend = Scripted::new(vec![]);
        let posts = vec![post(1, "bob", "+1"), post(2, "carol", "same")];
        let result = generator(backend.clone()).generate(&thread("Hi"), &posts).await;

        assert!(result.success);
        assert!(result.fallback);
        let data = result.data.unwrap();
        assert_eq!(data.sentiment, Sentiment::Neutral);
        assert_eq!(data.health_score(), 6);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_generation() {
        let backend = Scripted::new(vec![Ok(valid_response(8))]);
        let result = generator(backend.clone())
            .generate(&thread("Should we switch?"), &discussion(5))
            .await;

        assert!(result.success);
        assert!(!result.fallback);
        assert!(result.error.is_none());
        let data = result.data.unwrap();
        assert_eq!(data.health_label(), HealthLabel::Healthy);
        assert_eq!(data.sentiment, Sentiment::Mixed);
        assert_eq!(data.contributors.len(), 2);

        let requests = backend.requests.lock().unwrap();
        assert!(requests[0].prompt.contains("Should we switch?"));
        assert!(requests[0].schema["properties"].get("healthScore").is_some());
    }

    #[tokio::test]
    async fn test_backend_failure_yields_fallback() {
        let backend = Scripted::new(vec![Err("connection refused".into())]);
        let posts = discussion(7);
        let result = generator(backend).generate(&thread("Body"), &posts).await;

        assert!(!result.success);
        assert!(result.fallback);
        let error = result.error.unwrap();
        assert_eq!(error.category, ErrorCategory::Network);
        assert!(error.retryable);

        let data = result.data.unwrap();
        assert_eq!(data.health_score(), 5);
        assert_eq!(data.sentiment, Sentiment::Neutral);
        assert!(data.summary[0].contains("7 posts from 2 participants"));
        // carol has 4 posts, bob has 3
        assert_eq!(data.contributors[0].username, "carol");
        assert_eq!(data.contributors[1].username, "bob");
    }

    #[tokio::test]
    async fn test_schema_violation_is_terminal_validation_error() {
        let mut response = valid_response(8);
        response["sentiment"] = json!("Furious");
        let backend = Scripted::new(vec![Ok(response)]);
        let result = generator(backend).generate(&thread("Body"), &discussion(4)).await;

        let error = result.error.unwrap();
        assert_eq!(error.category, ErrorCategory::Validation);
        assert!(!error.retryable);
        assert!(result.data.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_classified() {
        let backend = Scripted::slow(Duration::from_secs(60));
        let result = generator(backend)
            .with_timeout(Duration::from_secs(30))
            .generate(&thread("Body"), &discussion(4))
            .await;

        assert!(!result.success);
        assert_eq!(result.error.unwrap().category, ErrorCategory::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_classified() {
        let backend = Scripted::slow(Duration::from_secs(20));
        let generator = generator(backend);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = generator
            .generate_with_cancel(&thread("Body"), &discussion(4), &cancel)
            .await;
        assert_eq!(result.error.unwrap().category, ErrorCategory::Timeout);
        assert!(result.data.is_some());
    }

    #[test]
    fn test_validate_truncates_long_lists() {
        let response = json!({
            "summary": ["1", "2", "3", "4", "5", "6", "7"],
            "keyPoints": ["a", "b", "c", "d", "e", "f"],
            "contributors": [
                {"username": "u1", "contribution": "c"},
                {"username": "u2", "contribution": "c"},
                {"username": "u3", "contribution": "c"},
                {"username": "u4", "contribution": "c"},
                {"username": "u5", "contribution": "c"}
            ],
            "sentiment": "positive",
            "healthScore": 9
        });
        let data = validate_response(&response).unwrap();
        assert_eq!(data.summary, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(data.key_points.len(), 5);
        assert_eq!(data.contributors.len(), 4);
        assert_eq!(data.contributors[3].username, "u4");
        assert_eq!(data.sentiment, Sentiment::Positive);
    }

    #[test]
    fn test_validate_rejects_structural_violations() {
        let cases: Vec<(&str, Value)> = vec![
            ("summary", json!("not a list")),
            ("keyPoints", json!([1, 2, 3])),
            ("contributors", json!([{"username": "", "contribution": "x"}])),
            ("contributors", json!([{"username": "bob"}])),
            ("sentiment", json!("No Discussion")),
            ("sentiment", json!(3)),
            ("healthScore", json!(0)),
            ("healthScore", json!(11)),
            ("healthScore", json!(7.5)),
            ("healthScore", json!("7")),
        ];
        for (field, bad) in cases {
            let mut response = valid_response(5);
            response[field] = bad.clone();
            assert!(
                matches!(validate_response(&response), Err(GenerationError::InvalidFormat(_))),
                "{} = {}",
                field,
                bad
            );
        }

        for field in ["summary", "keyPoints", "contributors", "sentiment", "healthScore"] {
            let mut response = valid_response(5);
            response.as_object_mut().unwrap().remove(field);
            assert!(validate_response(&response).is_err(), "missing {}", field);
        }
        assert!(validate_response(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_validate_accepts_integral_float_score() {
        let mut response = valid_response(5);
        response["healthScore"] = json!(4.0);
        let data = validate_response(&response).unwrap();
        assert_eq!(data.health_score(), 4);
        assert_eq!(data.health_label(), HealthLabel::NeedsAttention);
    }

    #[test]
    fn test_label_never_taken_from_model() {
        let mut response = valid_response(2);
        response["healthLabel"] = json!("Healthy");
        let data = validate_response(&response).unwrap();
        assert_eq!(data.health_label(), HealthLabel::HeatedDiscussion);
    }

    #[test]
    fn test_small_threads_are_not_sampled() {
        let posts = discussion(20);
        assert_eq!(sample_posts(&posts).len(), 20);
    }

    #[test]
    fn test_sampling_keeps_edges_and_longest_middle() {
        let mut posts: Vec<Post> = (0..40).map(|i| post(i, "bob", "short reply")).collect();
        // substantive middle posts of increasing length
        for i in 10..30 {
            posts[i].body = "x".repeat(60 + i);
        }
        let sampled = sample_posts(&posts);
        let ids: Vec<&str> = sampled.iter().map(|p| p.id.as_str()).collect();

        assert_eq!(sampled.len(), 3 + 3 + 14);
        assert_eq!(&ids[..3], &["p-0", "p-1", "p-2"]);
        assert_eq!(&ids[ids.len() - 3..], &["p-37", "p-38", "p-39"]);
        // the 14 longest middle posts are 16..30
        assert!(ids.contains(&"p-16"));
        assert!(!ids.contains(&"p-15"));
        // chronological order
        assert!(sampled.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn test_sampling_skips_short_middle_posts_and_dedupes() {
        let mut posts: Vec<Post> = (0..25).map(|i| post(i, "bob", "ok")).collect();
        posts[10].body = "y".repeat(80);
        // duplicate id of an edge post
        posts[12].id = "p-0".to_string();
        posts[12].body = "z".repeat(90);
        let sampled = sample_posts(&posts);
        let ids: Vec<&str> = sampled.iter().map(|p| p.id.as_str()).collect();

        assert_eq!(ids.iter().filter(|id| **id == "p-0").count(), 1);
        assert!(ids.contains(&"p-10"));
        assert_eq!(sampled.len(), 7);
    }

    #[test]
    fn test_prompt_mentions_sampling() {
        let posts = discussion(30);
        let sampled = sample_posts(&posts);
        let prompt = build_prompt(&thread("Opening"), &sampled, posts.len());
        assert!(prompt.contains(&format!("{} of 30 shown", sampled.len())));
        assert!(prompt.contains("[1] bob"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 2), "hé…");
    }

    #[test]
    fn test_content_length_counts_trimmed_text() {
        let posts = vec![post(1, "bob", "   abc   ")];
        assert_eq!(content_length(&thread("  de  "), &posts), 5);
    }

    #[tokio::test]
    async fn test_generator_performs_analysis_only_for_every_score() {
        for score in 1..=10u8 {
            let backend = Scripted::new(vec![Ok(valid_response(score))]);
            let result = generator(backend.clone())
                .generate(&thread("Body"), &discussion(6))
                .await;
            let data = result.data.unwrap();
            assert_eq!(data.health_score(), score);
            assert_eq!(data.health_label(), HealthLabel::from_score(score));
            // the only outbound interaction is the single generation request
            assert_eq!(backend.calls(), 1);
        }
    }
}
