//! Engagement scoring.
//!
//! Four signals are min-max normalized over the current candidate pool and
//! combined with sentiment using fixed weights. Scoring is a pure function of
//! the event and the pool's bounds.

use crate::models::Event;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub popularity: f64,
    pub attendance: f64,
    pub hashtag: f64,
    pub feedback: f64,
    pub sentiment: f64,
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.popularity + self.attendance + self.hashtag + self.feedback + self.sentiment
    }
}

pub const WEIGHTS: Weights = Weights {
    popularity: 0.20,
    attendance: 0.20,
    hashtag: 0.15,
    feedback: 0.25,
    sentiment: 0.20,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        values.fold(None, |acc: Option<Range>, v| match acc {
            None => Some(Range { min: v, max: v }),
            Some(r) => Some(Range {
                min: r.min.min(v),
                max: r.max.max(v),
            }),
        })
    }

    /// Min-max scale `x`. With zero width the only pool value maps to 1.
    ///
    /// Values outside the range are not clamped and may leave `[0, 1]`.
    pub fn normalize(&self, x: f64) -> f64 {
        if self.max > self.min {
            (x - self.min) / (self.max - self.min)
        } else if x == self.min {
            1.0
        } else {
            0.0
        }
    }
}

const ZERO: Range = Range { min: 0.0, max: 0.0 };

/// Per-run normalization bounds of the four scaled signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub popularity: Range,
    pub attendance: Range,
    pub hashtag_mentions: Range,
    pub feedback_score: Range,
}

impl Bounds {
    /// Bounds over `events`; zero-width at 0 when the slice is empty.
    pub fn from_events(events: &[Event]) -> Self {
        Self {
            popularity: Range::of(events.iter().map(|e| e.popularity)).unwrap_or(ZERO),
            attendance: Range::of(events.iter().map(|e| e.attendance as f64)).unwrap_or(ZERO),
            hashtag_mentions: Range::of(events.iter().map(|e| e.hashtag_mentions as f64)).unwrap_or(ZERO),
            feedback_score: Range::of(events.iter().map(|e| e.feedback_score)).unwrap_or(ZERO),
        }
    }
}

pub fn engagement_score(event: &Event, bounds: &Bounds) -> f64 {
    let sentiment = if event.avg_positive_sentiment.is_nan() {
        0.0
    } else {
        event.avg_positive_sentiment.clamp(0.0, 1.0)
    };

    WEIGHTS.popularity * bounds.popularity.normalize(event.popularity)
        + WEIGHTS.attendance * bounds.attendance.normalize(event.attendance as f64)
        + WEIGHTS.hashtag * bounds.hashtag_mentions.normalize(event.hashtag_mentions as f64)
        + WEIGHTS.feedback * bounds.feedback_score.normalize(event.feedback_score)
        + WEIGHTS.sentiment * sentiment
}
