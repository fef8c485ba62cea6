//! Review aggregation: match comments to events, classify their sentiment and
//! fold the results into the catalog consumed by the selector.

use crate::catalog::{column_indices, load_base_events, write_catalog};
use crate::classifier::{positive_score, SentimentClassifier};
use crate::error::{PlannerError, Result};
use crate::matcher::EventMatcher;
use crate::models::Event;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Sentiment assumed for events nobody reviewed.
pub const DEFAULT_SENTIMENT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrepareSummary {
    pub reviews: usize,
    pub matched: usize,
    pub classified: usize,
    pub events: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ReviewAggregate {
    total: f64,
    count: u64,
}

pub fn load_comments(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| PlannerError::Catalog(format!("File not found: {} ({})", path.display(), e)))?;
    let headers = reader.headers()?.clone();
    let idx = column_indices(&headers, &["Comments"], path)?[0];

    let mut comments = Vec::new();
    for record in reader.records() {
        let record = record?;
        comments.push(record.get(idx).unwrap_or("").to_string());
    }
    Ok(comments)
}

/// Set `avg_positive_sentiment` and `review_count` from per-comment scores.
///
/// `scored` pairs an event id with the positive score of one review.
pub fn aggregate_reviews(events: &mut [Event], scored: &[(String, f64)]) {
    let mut by_event: HashMap<&str, ReviewAggregate> = HashMap::new();
    for (event_id, score) in scored {
        let entry = by_event.entry(event_id.as_str()).or_default();
        entry.total += score;
        entry.count += 1;
    }

    for event in events.iter_mut() {
        match by_event.get(event.id.as_str()) {
            Some(agg) if agg.count > 0 => {
                event.avg_positive_sentiment = agg.total / agg.count as f64;
                event.review_count = agg.count;
            }
            _ => {
                event.avg_positive_sentiment = DEFAULT_SENTIMENT;
                event.review_count = 0;
            }
        }
    }
}

/// Match, classify in order-preserving batches, and aggregate.
///
/// A failed batch is logged and its comments are left out.
pub async fn score_reviews<C: SentimentClassifier>(
    events: &mut [Event],
    comments: &[String],
    classifier: &C,
    batch_size: usize,
) -> Result<PrepareSummary> {
    let matcher = EventMatcher::new(events)?;

    let matched: Vec<(String, &String)> = comments
        .iter()
        .filter_map(|c| matcher.match_comment(c).map(|known| (known.id.clone(), c)))
        .collect();
    info!(reviews = comments.len(), matched = matched.len(), "comments matched to events");
    if matched.is_empty() {
        warn!("no comments matched any known event, using default sentiment for all");
    }

    let batch_size = batch_size.max(1);
    let total_batches = matched.len().div_ceil(batch_size);
    let mut scored: Vec<(String, f64)> = Vec::with_capacity(matched.len());

    for (batch_no, batch) in matched.chunks(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|(_, c)| (*c).clone()).collect();
        match classifier.classify_batch(&texts).await {
            Ok(results) => {
                for ((event_id, _), scores) in batch.iter().zip(results.iter()) {
                    scored.push((event_id.clone(), positive_score(scores)));
                }
            }
            Err(e) => warn!(batch = batch_no + 1, total_batches, error = %e, "sentiment batch failed"),
        }
        if (batch_no + 1) % 10 == 0 {
            info!(batch = batch_no + 1, total_batches, "sentiment batches processed");
        }
    }

    aggregate_reviews(events, &scored);

    Ok(PrepareSummary {
        reviews: comments.len(),
        matched: matched.len(),
        classified: scored.len(),
        events: events.len(),
    })
}

/// Full pipeline from raw review and event tables to the aggregated catalog.
pub async fn prepare<C: SentimentClassifier>(
    reviews_path: impl AsRef<Path>,
    events_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    classifier: &C,
    batch_size: usize,
) -> Result<PrepareSummary> {
    let comments = load_comments(reviews_path.as_ref())?;
    info!(path = %reviews_path.as_ref().display(), reviews = comments.len(), "loaded reviews");

    let mut events = load_base_events(events_path.as_ref())?;
    info!(path = %events_path.as_ref().display(), events = events.len(), "loaded events");

    let summary = score_reviews(&mut events, &comments, classifier, batch_size).await?;

    write_catalog(output_path.as_ref(), &events)?;
    info!(path = %output_path.as_ref().display(), "aggregated catalog written");
    Ok(summary)
}
