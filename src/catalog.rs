//! Event catalog ingestion and export.
//!
//! The catalog is a CSV keyed by `Event ID`. Row order is preserved because
//! it is the tie-break order for ranking.

use crate::error::{PlannerError, Result};
use crate::models::{clean_event_cost, Event};
use csv::{Reader, StringRecord, Writer};
use std::path::Path;
use tracing::debug;

pub const BASE_COLUMNS: [&str; 8] = [
    "Event ID",
    "Event Name",
    "Event Type",
    "Event Cost",
    "Popularity",
    "Attendance",
    "Hashtag Mentions",
    "Feedback Score",
];

pub const AGGREGATE_COLUMNS: [&str; 2] = ["AvgPositiveSentiment", "ReviewCount"];

/// Load the aggregated catalog consumed by the selector.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<Event>> {
    let required: Vec<&str> = BASE_COLUMNS.iter().chain(AGGREGATE_COLUMNS.iter()).copied().collect();
    read_events(path.as_ref(), &required, true)
}

/// Load the raw events table (no review aggregates yet).
pub fn load_base_events(path: impl AsRef<Path>) -> Result<Vec<Event>> {
    read_events(path.as_ref(), &BASE_COLUMNS, false)
}

fn open_reader(path: &Path) -> Result<Reader<std::fs::File>> {
    Reader::from_path(path)
        .map_err(|e| PlannerError::Catalog(format!("File not found: {} ({})", path.display(), e)))
}

/// Map every required column to its index, or report all missing ones.
pub(crate) fn column_indices(headers: &StringRecord, required: &[&str], source: &Path) -> Result<Vec<usize>> {
    let mut indices = Vec::with_capacity(required.len());
    let mut missing = Vec::new();

    for column in required {
        match headers.iter().position(|h| h.trim() == *column) {
            Some(idx) => indices.push(idx),
            None => missing.push(*column),
        }
    }

    if !missing.is_empty() {
        return Err(PlannerError::Catalog(format!(
            "{} is missing required columns: {}",
            source.display(),
            missing.join(", ")
        )));
    }
    Ok(indices)
}

fn read_events(path: &Path, required: &[&str], with_aggregates: bool) -> Result<Vec<Event>> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers()?.clone();
    let idx = column_indices(&headers, required, path)?;

    let mut events = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let cell = |i: usize| record.get(idx[i]).unwrap_or("").trim();
        let line = row + 2;

        let (avg_positive_sentiment, review_count) = if with_aggregates {
            (parse_number(cell(8), "AvgPositiveSentiment", line)?, parse_count(cell(9), "ReviewCount", line)?)
        } else {
            (0.5, 0)
        };

        events.push(Event {
            id: cell(0).to_string(),
            name: cell(1).to_string(),
            event_type: cell(2).to_string(),
            cost: clean_event_cost(cell(3)),
            popularity: parse_number(cell(4), "Popularity", line)?,
            attendance: parse_count(cell(5), "Attendance", line)?,
            hashtag_mentions: parse_count(cell(6), "Hashtag Mentions", line)?,
            feedback_score: parse_number(cell(7), "Feedback Score", line)?,
            avg_positive_sentiment,
            review_count,
        });
    }

    debug!(path = %path.display(), events = events.len(), "catalog loaded");
    Ok(events)
}

fn parse_number(value: &str, column: &str, line: usize) -> Result<f64> {
    value
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| PlannerError::Catalog(format!("line {}: invalid {} value '{}'", line, column, value)))
}

// Counts are sometimes exported as floats ("12.0").
fn parse_count(value: &str, column: &str, line: usize) -> Result<u64> {
    let number = parse_number(value, column, line)?;
    if number < 0.0 {
        return Err(PlannerError::Catalog(format!("line {}: invalid {} value '{}'", line, column, value)));
    }
    Ok(number.round() as u64)
}

/// Write events with their aggregates in the catalog column layout.
pub fn write_catalog(path: impl AsRef<Path>, events: &[Event]) -> Result<()> {
    let mut writer = Writer::from_path(path.as_ref())?;

    let mut headers: Vec<&str> = BASE_COLUMNS.to_vec();
    headers.extend_from_slice(&AGGREGATE_COLUMNS);
    writer.write_record(&headers)?;

    for event in events {
        writer.write_record(&[
            event.id.clone(),
            event.name.clone(),
            event.event_type.clone(),
            event.cost.to_string(),
            event.popularity.to_string(),
            event.attendance.to_string(),
            event.hashtag_mentions.to_string(),
            event.feedback_score.to_string(),
            event.avg_positive_sentiment.to_string(),
            event.review_count.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
