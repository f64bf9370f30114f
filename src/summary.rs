//! Summary types - the structured analysis produced for a thread.

use crate::classifier::UserFriendlyError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of summary bullets kept from a generation
pub const MAX_SUMMARY_ITEMS: usize = 5;
/// Maximum number of key points kept from a generation
pub const MAX_KEY_POINTS: usize = 5;
/// Maximum number of contributors kept from a generation
pub const MAX_CONTRIBUTORS: usize = 4;

/// Coarse emotional tone of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Neutral,
    Mixed,
    Negative,
    #[serde(rename = "No Discussion")]
    NoDiscussion,
}

impl Sentiment {
    /// Parse a sentiment produced by the model.
    ///
    /// Case-insensitive. "No Discussion" is reserved for empty threads and is
    /// never accepted from generated output.
    pub fn from_generated(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "mixed" => Some(Self::Mixed),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Neutral => "Neutral",
            Self::Mixed => "Mixed",
            Self::Negative => "Negative",
            Self::NoDiscussion => "No Discussion",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label derived from a health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthLabel {
    Healthy,
    #[serde(rename = "Needs Attention")]
    NeedsAttention,
    #[serde(rename = "Heated Discussion")]
    HeatedDiscussion,
    /// Sentinel for threads with no replies (score 0)
    #[serde(rename = "New Thread")]
    NewThread,
}

impl HealthLabel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0 => Self::NewThread,
            1..=3 => Self::HeatedDiscussion,
            4..=6 => Self::NeedsAttention,
            _ => Self::Healthy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::NeedsAttention => "Needs Attention",
            Self::HeatedDiscussion => "Heated Discussion",
            Self::NewThread => "New Thread",
        }
    }
}

impl fmt::Display for HealthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notable participant and what they brought to the discussion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Contributor {
    /// Forum username of the participant
    #[schemars(length(min = 1))]
    pub username: String,
    /// One sentence on what this participant contributed
    #[schemars(length(min = 1))]
    pub contribution: String,
}

impl Contributor {
    pub fn new(username: impl Into<String>, contribution: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            contribution: contribution.into(),
        }
    }
}

/// Structured analysis of a thread.
///
/// `health_label` is always derived from `health_score` and cannot be set on
/// its own, so the two fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryData {
    pub summary: Vec<String>,
    pub key_points: Vec<String>,
    pub contributors: Vec<Contributor>,
    pub sentiment: Sentiment,
    health_score: u8,
    health_label: HealthLabel,
}

impl SummaryData {
    /// Build summary data, clamping the score to 0-10 and deriving its label
    pub fn new(
        summary: Vec<String>,
        key_points: Vec<String>,
        contributors: Vec<Contributor>,
        sentiment: Sentiment,
        health_score: u8,
    ) -> Self {
        let health_score = health_score.min(10);
        Self {
            summary,
            key_points,
            contributors,
            sentiment,
            health_score,
            health_label: HealthLabel::from_score(health_score),
        }
    }

    pub fn health_score(&self) -> u8 {
        self.health_score
    }

    pub fn health_label(&self) -> HealthLabel {
        self.health_label
    }
}

/// Outcome of one summary generation.
///
/// `fallback` is set whenever `data` was synthesized without the model, which
/// includes the deterministic edge cases (`success == true`) and the failure
/// path (`success == false`, with `error` populated).
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub success: bool,
    pub data: Option<SummaryData>,
    pub error: Option<UserFriendlyError>,
    pub fallback: bool,
}

impl SummaryResult {
    pub fn generated(data: SummaryData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            fallback: false,
        }
    }

    pub fn deterministic(data: SummaryData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            fallback: true,
        }
    }

    pub fn failed(error: UserFriendlyError, fallback: SummaryData) -> Self {
        Self {
            success: false,
            data: Some(fallback),
            error: Some(error),
            fallback: true,
        }
    }
}

/// Sentiments the model may choose from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub enum ModelSentiment {
    Positive,
    Neutral,
    Mixed,
    Negative,
}

/// Shape the model is asked to return.
///
/// Only used to produce the JSON schema sent with the generation request;
/// responses are validated field by field in the generator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    /// Short bullet summary of the discussion
    #[schemars(length(max = 5))]
    pub summary: Vec<String>,
    /// The main viewpoints or arguments raised
    #[schemars(length(min = 3, max = 5))]
    pub key_points: Vec<String>,
    /// The most influential participants
    #[schemars(length(min = 2, max = 4))]
    pub contributors: Vec<Contributor>,
    /// Overall tone of the thread
    pub sentiment: ModelSentiment,
    /// Constructiveness of the discussion, 1 (toxic) to 10 (exemplary)
    #[schemars(range(min = 1, max = 10))]
    pub health_score: u8,
}

/// JSON schema constraining the model's response
pub fn response_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(ModelSummary)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_label_buckets() {
        for score in 0..=10u8 {
            let expected = match score {
                0 => "New Thread",
                1..=3 => "Heated Discussion",
                4..=6 => "Needs Attention",
                _ => "Healthy",
            };
            assert_eq!(HealthLabel::from_score(score).as_str(), expected);
        }
    }

    #[test]
    fn test_summary_data_derives_label_and_clamps() {
        let data = SummaryData::new(vec![], vec![], vec![], Sentiment::Neutral, 42);
        assert_eq!(data.health_score(), 10);
        assert_eq!(data.health_label(), HealthLabel::Healthy);
    }

    #[test]
    fn test_sentiment_from_generated() {
        assert_eq!(Sentiment::from_generated(" mixed "), Some(Sentiment::Mixed));
        assert_eq!(Sentiment::from_generated("Positive"), Some(Sentiment::Positive));
        assert_eq!(Sentiment::from_generated("No Discussion"), None);
        assert_eq!(Sentiment::from_generated("angry"), None);
    }

    #[test]
    fn test_summary_data_serializes_flat_camel_case() {
        let data = SummaryData::new(
            vec!["One".into()],
            vec!["Two".into()],
            vec![Contributor::new("alice", "Opened the thread")],
            Sentiment::NoDiscussion,
            0,
        );
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["sentiment"], "No Discussion");
        assert_eq!(json["healthScore"], 0);
        assert_eq!(json["healthLabel"], "New Thread");
        assert_eq!(json["keyPoints"][0], "Two");
        assert_eq!(json["contributors"][0]["username"], "alice");
    }

    #[test]
    fn test_response_schema_names_required_fields() {
        let schema = response_schema();
        let properties = &schema["properties"];
        for field in ["summary", "keyPoints", "contributors", "sentiment", "healthScore"] {
            assert!(properties.get(field).is_some(), "missing {}", field);
        }
    }
}
