//! Error classification into a closed, user-facing taxonomy.
//!
//! Failures are matched against an ordered rule table of lowercase substring
//! patterns. The first matching rule wins, so the order of [`RULES`] is the
//! priority order.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Default wait suggested for rate limits that don't say how long to wait
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    RateLimit,
    Timeout,
    Authentication,
    NotFound,
    AiProcessing,
    Validation,
    Api,
    Unknown,
}

impl ErrorCategory {
    /// Whether failures of this category are worth retrying automatically
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::AiProcessing | Self::Api
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::NotFound => "not_found",
            Self::AiProcessing => "ai_processing",
            Self::Validation => "validation",
            Self::Api => "api",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure translated for people.
///
/// `title`/`message` are safe to show to users; `technical_details` holds the
/// raw error text and is meant for logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFriendlyError {
    pub category: ErrorCategory,
    pub title: String,
    pub message: String,
    pub actionable: bool,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_details: Option<String>,
}

impl fmt::Display for UserFriendlyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// One row of the classification table
struct Rule {
    category: ErrorCategory,
    patterns: &'static [&'static str],
}

impl Rule {
    fn matches(&self, haystack: &str) -> bool {
        self.patterns.iter().any(|p| haystack.contains(p))
    }
}

/// Classification rules in priority order
const RULES: &[Rule] = &[
    Rule {
        category: ErrorCategory::Network,
        patterns: &[
            "network",
            "connection refused",
            "connection reset",
            "connection closed",
            "failed to connect",
            "error sending request",
            "fetch failed",
            "econnrefused",
            "econnreset",
            "enotfound",
            "dns error",
            "offline",
            "socket hang up",
        ],
    },
    Rule {
        category: ErrorCategory::RateLimit,
        patterns: &["rate limit", "ratelimit", "too many requests", "429", "quota exceeded"],
    },
    Rule {
        category: ErrorCategory::Timeout,
        patterns: &[
            "timeout",
            "timed out",
            "deadline exceeded",
            "cancelled",
            "canceled",
            "aborted",
        ],
    },
    Rule {
        category: ErrorCategory::Authentication,
        patterns: &[
            "unauthorized",
            "unauthenticated",
            "authentication",
            "forbidden",
            "401",
            "403",
            "api key",
            "invalid token",
            "permission denied",
        ],
    },
    Rule {
        category: ErrorCategory::NotFound,
        patterns: &["not found", "404", "does not exist", "no such thread"],
    },
    Rule {
        category: ErrorCategory::AiProcessing,
        patterns: &[
            "model",
            "llm",
            "generation failed",
            "ai service",
            "completion",
            "overloaded",
            "content filter",
            "safety",
        ],
    },
    Rule {
        category: ErrorCategory::Validation,
        patterns: &["validation", "invalid", "required", "must be", "bad request", "400"],
    },
    Rule {
        category: ErrorCategory::Api,
        patterns: &[
            "api",
            "service",
            "server error",
            "unavailable",
            "bad gateway",
            "500",
            "502",
            "503",
        ],
    },
];

lazy_static! {
    static ref RETRY_AFTER: Regex = Regex::new(r"retry\D{0,20}?(\d+)").unwrap();
    static ref SECONDS: Regex = Regex::new(r"(\d+)\s*(?:seconds?|secs?\b|s\b)").unwrap();
}

/// Maps failures onto [`ErrorCategory`] and builds user-facing errors
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Determine the category for a message and optional context
    pub fn categorize(&self, message: &str, context: Option<&str>) -> ErrorCategory {
        let haystack = match context {
            Some(ctx) => format!("{} {}", message, ctx).to_lowercase(),
            None => message.to_lowercase(),
        };
        RULES
            .iter()
            .find(|rule| rule.matches(&haystack))
            .map(|rule| rule.category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    /// Classify an error message
    pub fn classify(&self, message: &str, context: Option<&str>) -> UserFriendlyError {
        let category = self.categorize(message, context);
        let mut error = template(category);
        if category == ErrorCategory::RateLimit {
            let secs = retry_after_secs(message).unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            error.retry_after = Some(secs);
            error.message = format!(
                "The AI service is receiving too many requests. Please wait {} seconds before trying again.",
                secs
            );
        }
        error.technical_details = Some(match context {
            Some(ctx) => format!("{} (context: {})", message, ctx),
            None => message.to_string(),
        });
        error
    }

    /// Classify any displayable error
    pub fn classify_error<E: fmt::Display + ?Sized>(
        &self,
        error: &E,
        context: Option<&str>,
    ) -> UserFriendlyError {
        self.classify(&error.to_string(), context)
    }

    pub fn is_retryable(&self, error: &UserFriendlyError) -> bool {
        error.category.is_retryable()
    }

    /// Backoff before the next attempt after `error`
    pub fn retry_delay(&self, error: &UserFriendlyError) -> Duration {
        match error.category {
            ErrorCategory::RateLimit => {
                Duration::from_secs(error.retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS))
            }
            ErrorCategory::Network => Duration::from_millis(5_000),
            ErrorCategory::Timeout => Duration::from_millis(10_000),
            ErrorCategory::AiProcessing => Duration::from_millis(15_000),
            _ => Duration::from_millis(5_000),
        }
    }
}

fn retry_after_secs(message: &str) -> Option<u64> {
    let lower = message.to_lowercase();
    RETRY_AFTER
        .captures(&lower)
        .or_else(|| SECONDS.captures(&lower))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn template(category: ErrorCategory) -> UserFriendlyError {
    let (title, message, actionable, suggestions): (&str, &str, bool, &[&str]) = match category {
        ErrorCategory::Network => (
            "Connection Problem",
            "We couldn't reach the summary service. Check your connection and try again.",
            true,
            &[
                "Check your internet connection",
                "Try again in a few moments",
                "Disable VPN or proxy if you are using one",
            ],
        ),
        ErrorCategory::RateLimit => (
            "Too Many Requests",
            "The AI service is receiving too many requests. Please wait before trying again.",
            true,
            &[
                "Wait a minute before requesting another summary",
                "Cached summaries are still available for unchanged threads",
            ],
        ),
        ErrorCategory::Timeout => (
            "Request Timed Out",
            "Generating the summary took too long. Long threads can take a while to analyze.",
            true,
            &[
                "Try again in a moment",
                "Very long threads may need a second attempt",
            ],
        ),
        ErrorCategory::Authentication => (
            "Authentication Required",
            "Your session could not be verified. Please sign in again.",
            true,
            &["Sign out and sign back in", "Check that your API credentials are valid"],
        ),
        ErrorCategory::NotFound => (
            "Thread Not Found",
            "This thread could not be found. It may have been deleted or moved.",
            false,
            &["Refresh the thread list", "Check that the thread still exists"],
        ),
        ErrorCategory::AiProcessing => (
            "Summary Generation Failed",
            "The AI couldn't produce a summary for this thread right now. A basic overview is shown instead.",
            false,
            &[
                "Try again later",
                "A statistical overview is shown in the meantime",
            ],
        ),
        ErrorCategory::Validation => (
            "Invalid Data",
            "The thread data or the generated summary was not in the expected format.",
            false,
            &["Refresh the thread and try again", "Report the problem if it persists"],
        ),
        ErrorCategory::Api => (
            "Service Error",
            "The summary service is having trouble. Please try again shortly.",
            true,
            &["Try again in a few minutes", "Check the service status page"],
        ),
        ErrorCategory::Unknown => (
            "Something Went Wrong",
            "An unexpected error occurred while summarizing this thread.",
            false,
            &["Try again later", "Report the problem if it keeps happening"],
        ),
    };
    UserFriendlyError {
        category,
        title: title.to_string(),
        message: message.to_string(),
        actionable,
        retryable: category.is_retryable(),
        retry_after: None,
        suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        technical_details: None,
    }
}
