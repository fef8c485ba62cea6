//! Sentiment classification of review comments.

use crate::config::{api_key_from_env, ClassifierConfig};
use crate::error::{PlannerError, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub score: f64,
}

/// Classifies a batch of texts, returning every label score per text in input order.
#[allow(async_fn_in_trait)]
pub trait SentimentClassifier {
    async fn classify_batch(&self, texts: &[String]) -> Result<Vec<Vec<Sentiment>>>;
}

/// Score of the `POSITIVE` label, or 0 when the model did not report one.
pub fn positive_score(scores: &[Sentiment]) -> f64 {
    scores
        .iter()
        .find(|s| s.label.eq_ignore_ascii_case("POSITIVE"))
        .map(|s| s.score)
        .unwrap_or(0.0)
}

/// Client for a Hugging Face inference-style text classification endpoint.
pub struct HttpClassifier {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpClassifier {
    pub fn new(config: &ClassifierConfig, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key_env.as_deref().and_then(api_key_from_env),
            timeout,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassifierReply {
    PerText(Vec<Vec<Sentiment>>),
    // Single-label pipelines answer with one object per text
    TopLabel(Vec<Sentiment>),
}

impl SentimentClassifier for HttpClassifier {
    async fn classify_batch(&self, texts: &[String]) -> Result<Vec<Vec<Sentiment>>> {
        let body = serde_json::json!({
            "inputs": texts,
            "parameters": {"top_k": null, "truncation": true, "max_length": 512}
        });

        let mut request = self.client.post(&self.api_url).timeout(self.timeout).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PlannerError::Classifier(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PlannerError::Classifier(format!(
                "classifier returned {}",
                response.status()
            )));
        }

        let reply: ClassifierReply = response
            .json()
            .await
            .map_err(|e| PlannerError::Classifier(format!("unexpected reply: {}", e)))?;

        let scores = match reply {
            ClassifierReply::PerText(scores) => scores,
            ClassifierReply::TopLabel(labels) => labels.into_iter().map(|l| vec![l]).collect(),
        };

        if scores.len() != texts.len() {
            return Err(PlannerError::Classifier(format!(
                "expected {} results, got {}",
                texts.len(),
                scores.len()
            )));
        }
        Ok(scores)
    }
}
