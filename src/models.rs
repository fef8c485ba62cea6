use crate::error::{PlannerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub event_type: String,
    pub cost: f64,
    pub popularity: f64, // 1..10
    pub attendance: u64,
    pub hashtag_mentions: u64,
    pub feedback_score: f64, // 1..10
    pub avg_positive_sentiment: f64, // 0..1
    pub review_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEvent {
    pub event: Event,
    pub engagement_score: f64,
    pub generated: bool,
}

/// Conjunctive filter; an absent constraint imposes no restriction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterConstraints {
    pub event_types: Option<BTreeSet<String>>,
    pub min_popularity: Option<f64>,
    pub min_sentiment: Option<f64>,
}

impl FilterConstraints {
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(types) = &self.event_types {
            if !types.contains(&normalize_event_type(&event.event_type)) {
                return false;
            }
        }
        if let Some(min) = self.min_popularity {
            if event.popularity < min {
                return false;
            }
        }
        if let Some(min) = self.min_sentiment {
            if event.avg_positive_sentiment < min {
                return false;
            }
        }
        true
    }
}

/// Lowercased, trimmed event type used for filter comparisons.
pub fn normalize_event_type(event_type: &str) -> String {
    event_type.trim().to_lowercase()
}

/// Parse a cost cell, tolerating thousands separators. Unparseable or non-finite costs become 0.
pub fn clean_event_cost(raw: &str) -> f64 {
    raw.replace(',', "")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|c| c.is_finite())
        .unwrap_or(0.0)
}

#[derive(Debug, Deserialize)]
struct RawSelectionRequest {
    budget: Option<serde_json::Value>,
    #[serde(default)]
    event_types: Option<Vec<String>>,
    #[serde(default)]
    min_popularity: Option<f64>,
    #[serde(default)]
    min_sentiment: Option<f64>,
    #[serde(default)]
    min_events: Option<serde_json::Value>,
}

/// A validated budget request.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRequest {
    pub budget: f64,
    pub constraints: FilterConstraints,
    pub min_events: usize,
}

impl SelectionRequest {
    pub fn new(budget: f64) -> Self {
        Self {
            budget,
            constraints: FilterConstraints::default(),
            min_events: 1,
        }
    }

    pub fn from_json(input: &str) -> Result<Self> {
        let raw: RawSelectionRequest = serde_json::from_str(input)
            .map_err(|e| PlannerError::InvalidInput(format!("Malformed request JSON: {}", e)))?;

        let budget = match raw.budget {
            None | Some(serde_json::Value::Null) => {
                return Err(PlannerError::InvalidInput("Budget not provided.".to_string()))
            }
            Some(value) => value
                .as_f64()
                .filter(|b| b.is_finite() && *b >= 0.0)
                .ok_or_else(|| {
                    PlannerError::InvalidInput(
                        "Invalid budget provided. Budget must be a non-negative number.".to_string(),
                    )
                })?,
        };

        let min_events = match raw.min_events {
            None | Some(serde_json::Value::Null) => 1,
            Some(value) => value
                .as_u64()
                .filter(|n| *n >= 1)
                .map(|n| n as usize)
                .ok_or_else(|| {
                    PlannerError::InvalidInput(
                        "Invalid min_events. It must be a positive integer.".to_string(),
                    )
                })?,
        };

        if let Some(min) = raw.min_popularity {
            if !min.is_finite() {
                return Err(PlannerError::InvalidInput("Invalid min_popularity.".to_string()));
            }
        }
        if let Some(min) = raw.min_sentiment {
            if !(0.0..=1.0).contains(&min) {
                return Err(PlannerError::InvalidInput(
                    "Invalid min_sentiment. It must lie within [0, 1].".to_string(),
                ));
            }
        }

        let event_types = raw
            .event_types
            .map(|types| types.iter().map(|t| normalize_event_type(t)).collect::<BTreeSet<_>>());

        Ok(Self {
            budget,
            constraints: FilterConstraints {
                event_types,
                min_popularity: raw.min_popularity,
                min_sentiment: raw.min_sentiment,
            },
            min_events,
        })
    }
}

/// Shape of a generator draft before validation. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(default, alias = "Event Name", alias = "Event", alias = "event_name")]
    pub name: Option<String>,
    #[serde(default, rename = "type", alias = "Event Type", alias = "event_type")]
    pub event_type: Option<String>,
    #[serde(default, alias = "Event Cost", alias = "Cost")]
    pub cost: Option<f64>,
    #[serde(default, alias = "Popularity")]
    pub popularity: Option<f64>,
    #[serde(default, alias = "Attendance")]
    pub attendance: Option<f64>,
    #[serde(default, alias = "Hashtag Mentions")]
    pub hashtag_mentions: Option<f64>,
    #[serde(default, alias = "Feedback Score")]
    pub feedback_score: Option<f64>,
    #[serde(default, alias = "AvgPositiveSentiment", alias = "avg_sentiment")]
    pub avg_positive_sentiment: Option<f64>,
    #[serde(default, alias = "ReviewCount")]
    pub review_count: Option<f64>,
}

impl EventDraft {
    /// Turn a draft into an event, or list every field it is missing or has malformed.
    pub fn into_event(self, id: String) -> std::result::Result<Event, Vec<&'static str>> {
        let mut missing = Vec::new();
        let name = self.name.filter(|n| !n.trim().is_empty());
        let event_type = self.event_type.filter(|t| !t.trim().is_empty());
        let cost = self.cost.filter(|c| c.is_finite() && *c >= 0.0);
        let attendance = self.attendance.and_then(draft_count);
        let hashtag_mentions = self.hashtag_mentions.and_then(draft_count);
        let review_count = match self.review_count {
            None => Some(0),
            Some(value) => draft_count(value),
        };

        if name.is_none() {
            missing.push("name");
        }
        if event_type.is_none() {
            missing.push("type");
        }
        if cost.is_none() {
            missing.push("cost");
        }
        if self.popularity.is_none() {
            missing.push("popularity");
        }
        if attendance.is_none() {
            missing.push("attendance");
        }
        if hashtag_mentions.is_none() {
            missing.push("hashtag_mentions");
        }
        if self.feedback_score.is_none() {
            missing.push("feedback_score");
        }
        if self.avg_positive_sentiment.is_none() {
            missing.push("avg_positive_sentiment");
        }
        if review_count.is_none() {
            missing.push("review_count");
        }

        match (
            name,
            event_type,
            cost,
            self.popularity,
            attendance,
            hashtag_mentions,
            self.feedback_score,
            self.avg_positive_sentiment,
            review_count,
        ) {
            (
                Some(name),
                Some(event_type),
                Some(cost),
                Some(popularity),
                Some(attendance),
                Some(hashtag_mentions),
                Some(feedback_score),
                Some(avg_positive_sentiment),
                Some(review_count),
            ) => Ok(Event {
                id,
                name: name.trim().to_string(),
                event_type: event_type.trim().to_string(),
                cost,
                popularity,
                attendance,
                hashtag_mentions,
                feedback_score,
                avg_positive_sentiment,
                review_count,
            }),
            _ => Err(missing),
        }
    }
}

// Models often write counts as floats ("250.0"); round like the catalog does.
fn draft_count(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0).then(|| value.round() as u64)
}

#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub selected: Vec<ScoredEvent>,
    pub total_cost: f64,
    pub budget: f64,
    pub shortfall_message: Option<String>,
}

/// One entry of `selected_events` in the response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedEventOutput {
    #[serde(rename = "Event")]
    pub event: String,
    #[serde(rename = "Type")]
    pub event_type: String,
    #[serde(rename = "Cost")]
    pub cost: f64,
    #[serde(rename = "Engagement_Score")]
    pub engagement_score: f64,
    #[serde(rename = "Popularity")]
    pub popularity: f64,
    #[serde(rename = "Avg_Sentiment")]
    pub avg_sentiment: f64,
    #[serde(rename = "Review_Count")]
    pub review_count: u64,
    #[serde(rename = "Explanation")]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResponse {
    pub selected_events: Vec<SelectedEventOutput>,
    pub total_estimated_cost: f64,
    pub budget: f64,
    pub events_selected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "error": self.error }).to_string()
    }
}

/// Render a selection outcome as the one JSON line printed on stdout.
///
/// `Ok` carries a response payload, `Err` an `{"error": ...}` object.
pub fn selection_output(outcome: std::result::Result<SelectionResponse, String>) -> std::result::Result<String, String> {
    let message = match outcome {
        Ok(response) => match serde_json::to_string(&response) {
            Ok(json) => return Ok(json),
            Err(e) => e.to_string(),
        },
        Err(message) => message,
    };
    Err(ErrorResponse::new(message).to_json())
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
