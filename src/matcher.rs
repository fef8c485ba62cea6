use crate::error::{PlannerError, Result};
use crate::models::Event;
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone, PartialEq)]
pub struct KnownEvent {
    pub id: String,
    pub name: String,
}

/// Matches free-text comments to catalog events by whole-word name mentions.
pub struct EventMatcher {
    patterns: Vec<(Regex, KnownEvent)>,
}

impl EventMatcher {
    pub fn new(events: &[Event]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(events.len());
        for event in events {
            let name = event.name.trim();
            if name.is_empty() {
                continue;
            }
            let pattern = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(name)))
                .case_insensitive(true)
                .build()
                .map_err(|e| PlannerError::Catalog(format!("cannot match event '{}': {}", name, e)))?;
            patterns.push((
                pattern,
                KnownEvent {
                    id: event.id.clone(),
                    name: event.name.clone(),
                },
            ));
        }
        Ok(Self { patterns })
    }

    /// First event, in catalog order, mentioned in the comment.
    pub fn match_comment(&self, comment: &str) -> Option<&KnownEvent> {
        self.patterns
            .iter()
            .find(|(pattern, _)| pattern.is_match(comment))
            .map(|(_, known)| known)
    }
}
