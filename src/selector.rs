//! Budget-constrained event selection.
//!
//! Pipeline: filter the catalog, score the survivors against bounds derived
//! from them, rank, greedily pack under the budget, top up with generated
//! events when too few fit, then attach explanations.
//!
//! The packing step is a single-pass greedy approximation of a knapsack. It
//! is a best-effort heuristic and does not maximize total engagement for a
//! given budget.

use crate::error::{PlannerError, Result};
use crate::llm::{GenerationRequest, Generator};
use crate::models::{
    round_to, Event, FilterConstraints, ScoredEvent, SelectedEventOutput, SelectionRequest, SelectionResponse,
    SelectionResult,
};
use crate::scoring::{engagement_score, Bounds};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const EXPLANATION_UNAVAILABLE: &str = "Explanation unavailable: description service failed.";

/// Filtered candidates and their bounds for one selection run.
#[derive(Debug, Clone)]
pub struct SelectionContext {
    pub candidates: Vec<Event>,
    pub bounds: Bounds,
}

impl SelectionContext {
    pub fn new(catalog: &[Event], constraints: &FilterConstraints) -> Self {
        let candidates = filter_events(catalog, constraints);
        // With no candidates the bounds only ever score generated drafts.
        let bounds = if candidates.is_empty() {
            Bounds::from_events(catalog)
        } else {
            Bounds::from_events(&candidates)
        };
        Self { candidates, bounds }
    }

    pub fn score(&self, event: Event, generated: bool) -> ScoredEvent {
        let engagement_score = engagement_score(&event, &self.bounds);
        ScoredEvent {
            event,
            engagement_score,
            generated,
        }
    }

    /// Score every candidate, keeping catalog order.
    pub fn scored_candidates(&self) -> Vec<ScoredEvent> {
        self.candidates.iter().cloned().map(|e| self.score(e, false)).collect()
    }
}

pub fn filter_events(catalog: &[Event], constraints: &FilterConstraints) -> Vec<Event> {
    catalog.iter().filter(|e| constraints.matches(e)).cloned().collect()
}

/// Sort by engagement descending. Stable, so ties keep catalog order.
pub fn rank(mut scored: Vec<ScoredEvent>) -> Vec<ScoredEvent> {
    scored.sort_by(|a, b| b.engagement_score.total_cmp(&a.engagement_score));
    scored
}

/// Accept events in ranked order while the running total fits the budget.
///
/// An event that does not fit is skipped, not a stop signal. Names already
/// accepted are skipped even when the duplicate would fit.
pub fn greedy_pack(ranked: Vec<ScoredEvent>, budget: f64) -> (Vec<ScoredEvent>, f64) {
    let mut selected = Vec::new();
    let mut total_cost = 0.0;
    let mut names_seen: HashSet<String> = HashSet::new();

    for candidate in ranked {
        if names_seen.contains(&candidate.event.name) {
            continue;
        }
        if total_cost + candidate.event.cost <= budget {
            total_cost += candidate.event.cost;
            names_seen.insert(candidate.event.name.clone());
            selected.push(candidate);
        }
    }

    (selected, total_cost)
}

pub struct EventSelector<'a, G> {
    generator: &'a G,
    call_timeout: Duration,
}

impl<'a, G: Generator> EventSelector<'a, G> {
    pub fn new(generator: &'a G, call_timeout: Duration) -> Self {
        Self {
            generator,
            call_timeout,
        }
    }

    /// Run filtering, scoring, packing and supplemental generation.
    pub async fn select(&self, catalog: &[Event], request: &SelectionRequest) -> SelectionResult {
        // Step 1: Filter and derive bounds for this run
        let context = SelectionContext::new(catalog, &request.constraints);
        info!(
            catalog = catalog.len(),
            candidates = context.candidates.len(),
            budget = request.budget,
            "selection started"
        );

        // Step 2: Score and rank
        let ranked = rank(context.scored_candidates());

        // Step 3: Greedy pack under the budget
        let (mut selected, mut total_cost) = greedy_pack(ranked, request.budget);
        debug!(selected = selected.len(), total_cost, "greedy pack finished");

        // Step 4: Top up with generated events if short
        let remaining = request.budget - total_cost;
        if selected.len() < request.min_events && remaining > 0.0 {
            self.supplement(&context, request, &mut selected, &mut total_cost).await;
        }

        let shortfall_message = shortfall_message(selected.len(), request.min_events, request.budget);
        if let Some(message) = &shortfall_message {
            info!(message = %message, "selection short of requested minimum");
        }

        SelectionResult {
            selected,
            total_cost,
            budget: request.budget,
            shortfall_message,
        }
    }

    async fn supplement(
        &self,
        context: &SelectionContext,
        request: &SelectionRequest,
        selected: &mut Vec<ScoredEvent>,
        total_cost: &mut f64,
    ) {
        let num_needed = request.min_events - selected.len();
        let remaining_budget = request.budget - *total_cost;
        let generation = GenerationRequest {
            count: num_needed,
            constraints: request.constraints.clone(),
            existing_names: selected.iter().map(|s| s.event.name.clone()).collect(),
            remaining_budget,
            per_event_budget: remaining_budget / num_needed as f64,
        };
        info!(num_needed, remaining_budget, "requesting supplemental events");

        let drafts = match self.call("event generator", self.generator.generate(&generation)).await {
            Ok(drafts) => drafts,
            Err(e) => {
                warn!(error = %e, "supplemental generation unavailable");
                return;
            }
        };

        let mut names_seen: HashSet<String> = selected.iter().map(|s| s.event.name.clone()).collect();
        let mut accepted = 0usize;

        for (i, draft) in drafts.into_iter().enumerate() {
            if accepted == num_needed {
                break;
            }
            let event = match draft.into_event(format!("GEN-{}", i + 1)) {
                Ok(event) => event,
                Err(missing) => {
                    warn!(draft = i + 1, missing = ?missing, "dropping incomplete draft");
                    continue;
                }
            };
            if !request.constraints.matches(&event) {
                warn!(name = %event.name, event_type = %event.event_type, "dropping draft outside the requested filters");
                continue;
            }
            if names_seen.contains(&event.name) {
                debug!(name = %event.name, "draft duplicates a selected event");
                continue;
            }
            // Scored against the catalog-derived bounds, never re-derived.
            let scored = context.score(event, true);
            if *total_cost + scored.event.cost <= request.budget {
                *total_cost += scored.event.cost;
                names_seen.insert(scored.event.name.clone());
                info!(name = %scored.event.name, cost = scored.event.cost, "accepted supplemental event");
                selected.push(scored);
                accepted += 1;
            } else {
                debug!(name = %scored.event.name, cost = scored.event.cost, "draft exceeds remaining budget");
            }
        }
    }

    /// Select and assemble the response payload, attaching explanations.
    pub async fn respond(&self, catalog: &[Event], request: &SelectionRequest) -> SelectionResponse {
        let result = self.select(catalog, request).await;
        self.assemble(result).await
    }

    pub async fn assemble(&self, result: SelectionResult) -> SelectionResponse {
        let mut selected_events = Vec::with_capacity(result.selected.len());

        for scored in &result.selected {
            let event = &scored.event;
            let explanation = match self
                .call("description service", self.generator.describe(&event.name, &event.event_type))
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    warn!(name = %event.name, error = %e, "using placeholder explanation");
                    EXPLANATION_UNAVAILABLE.to_string()
                }
            };

            selected_events.push(SelectedEventOutput {
                event: event.name.clone(),
                event_type: event.event_type.clone(),
                cost: round_to(event.cost, 2),
                engagement_score: round_to(scored.engagement_score, 4),
                popularity: event.popularity,
                avg_sentiment: round_to(event.avg_positive_sentiment, 3),
                review_count: event.review_count,
                explanation,
            });
        }

        SelectionResponse {
            events_selected: selected_events.len(),
            selected_events,
            total_estimated_cost: round_to(result.total_cost, 2),
            budget: result.budget,
            message: result.shortfall_message,
        }
    }

    async fn call<T>(&self, what: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(PlannerError::Timeout(what, self.call_timeout.as_secs())),
        }
    }
}

fn shortfall_message(selected: usize, min_events: usize, budget: f64) -> Option<String> {
    if selected >= min_events {
        return None;
    }
    if selected == 0 {
        Some(format!("No events can be organized within your budget of {:.2}.", budget))
    } else {
        Some(format!(
            "Only {} of the requested {} events could be organized within your budget of {:.2}.",
            selected, min_events, budget
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventDraft;
    use std::sync::Mutex;

    fn event(name: &str, cost: f64, popularity: f64, attendance: u64, hashtags: u64, feedback: f64, sentiment: f64) -> Event {
        Event {
            id: format!("E-{}", name),
            name: name.to_string(),
            event_type: "Cultural".to_string(),
            cost,
            popularity,
            attendance,
            hashtag_mentions: hashtags,
            feedback_score: feedback,
            avg_positive_sentiment: sentiment,
            review_count: 3,
        }
    }

    fn full_draft(name: &str, cost: f64) -> EventDraft {
        EventDraft {
            name: Some(name.to_string()),
            event_type: Some("Cultural".to_string()),
            cost: Some(cost),
            popularity: Some(6.0),
            attendance: Some(40.0),
            hashtag_mentions: Some(4.0),
            feedback_score: Some(7.0),
            avg_positive_sentiment: Some(0.7),
            review_count: None,
        }
    }

    #[derive(Default)]
    struct FakeGenerator {
        drafts: Vec<EventDraft>,
        fail_generate: bool,
        fail_describe: bool,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl Generator for FakeGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<Vec<EventDraft>> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_generate {
                return Err(PlannerError::Generator("boom".to_string()));
            }
            Ok(self.drafts.clone())
        }

        async fn describe(&self, name: &str, event_type: &str) -> Result<String> {
            if self.fail_describe {
                return Err(PlannerError::Generator("boom".to_string()));
            }
            Ok(format!("{} is a crowd-pleasing {} event.", name, event_type))
        }
    }

    struct SlowGenerator;

    impl Generator for SlowGenerator {
        async fn generate(&self, _request: &GenerationRequest) -> Result<Vec<EventDraft>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![full_draft("Late Show", 1.0)])
        }

        async fn describe(&self, _name: &str, _event_type: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".to_string())
        }
    }

    fn two_event_catalog() -> Vec<Event> {
        vec![
            event("A", 100.0, 10.0, 100, 10, 10.0, 1.0),
            event("B", 50.0, 1.0, 1, 1, 1.0, 0.0),
        ]
    }

    fn selector<G: Generator>(generator: &G) -> EventSelector<'_, G> {
        EventSelector::new(generator, Duration::from_secs(5))
    }

    #[test]
    fn filter_is_conjunctive() {
        let mut catalog = two_event_catalog();
        catalog[1].event_type = "Technical".to_string();
        let constraints = FilterConstraints {
            event_types: Some(["cultural".to_string()].into_iter().collect()),
            min_popularity: Some(5.0),
            min_sentiment: Some(0.5),
        };
        let filtered = filter_events(&catalog, &constraints);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "A");

        let none_match = FilterConstraints {
            min_popularity: Some(11.0),
            ..FilterConstraints::default()
        };
        assert!(filter_events(&catalog, &none_match).is_empty());
    }

    #[test]
    fn bounds_follow_filtered_pool() {
        let catalog = vec![
            event("A", 10.0, 9.0, 500, 50, 9.0, 0.9),
            event("B", 10.0, 2.0, 10, 1, 2.0, 0.2),
            event("C", 10.0, 6.0, 200, 20, 6.0, 0.6),
        ];
        let constraints = FilterConstraints {
            min_popularity: Some(5.0),
            ..FilterConstraints::default()
        };
        let context = SelectionContext::new(&catalog, &constraints);
        assert_eq!(context.bounds.popularity.min, 6.0);
        assert_eq!(context.bounds.popularity.max, 9.0);
    }

    #[test]
    fn rank_is_stable_on_ties() {
        let catalog = vec![
            event("first", 10.0, 5.0, 10, 1, 5.0, 0.5),
            event("second", 20.0, 5.0, 10, 1, 5.0, 0.5),
            event("third", 30.0, 5.0, 10, 1, 5.0, 0.5),
        ];
        let context = SelectionContext::new(&catalog, &FilterConstraints::default());
        let names: Vec<String> = rank(context.scored_candidates()).into_iter().map(|s| s.event.name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn greedy_pack_skips_instead_of_stopping() {
        let catalog = vec![
            event("big", 90.0, 10.0, 100, 10, 10.0, 1.0),
            event("huge", 50.0, 8.0, 80, 8, 8.0, 0.8),
            event("small", 10.0, 1.0, 1, 1, 1.0, 0.0),
        ];
        let context = SelectionContext::new(&catalog, &FilterConstraints::default());
        let (selected, total) = greedy_pack(rank(context.scored_candidates()), 100.0);
        let names: Vec<&str> = selected.iter().map(|s| s.event.name.as_str()).collect();
        assert_eq!(names, vec!["big", "small"]);
        assert_eq!(total, 100.0);
    }

    #[test]
    fn greedy_pack_deduplicates_by_name() {
        let catalog = vec![
            event("Quiz", 10.0, 9.0, 90, 9, 9.0, 0.9),
            event("Quiz", 5.0, 8.0, 80, 8, 8.0, 0.8),
            event("Poetry", 5.0, 1.0, 1, 1, 1.0, 0.1),
        ];
        let context = SelectionContext::new(&catalog, &FilterConstraints::default());
        let (selected, total) = greedy_pack(rank(context.scored_candidates()), 1000.0);
        let names: Vec<&str> = selected.iter().map(|s| s.event.name.as_str()).collect();
        assert_eq!(names, vec!["Quiz", "Poetry"]);
        assert_eq!(total, 15.0);
    }

    #[tokio::test]
    async fn higher_scoring_event_fills_budget_first() {
        let generator = FakeGenerator {
            fail_generate: true,
            ..FakeGenerator::default()
        };
        let result = selector(&generator)
            .select(&two_event_catalog(), &SelectionRequest::new(120.0))
            .await;

        assert_eq!(result.selected.len(), 1);
        assert_eq!(result.selected[0].event.name, "A");
        assert_eq!(result.total_cost, 100.0);
        assert!(result.shortfall_message.is_none());
    }

    #[tokio::test]
    async fn zero_budget_selects_nothing_and_skips_generation() {
        let generator = FakeGenerator::default();
        let response = selector(&generator)
            .respond(&two_event_catalog(), &SelectionRequest::new(0.0))
            .await;

        assert!(response.selected_events.is_empty());
        assert_eq!(response.total_estimated_cost, 0.0);
        assert_eq!(response.events_selected, 0);
        assert!(response.message.is_some());
        assert!(generator.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn supplemental_generation_requests_the_shortfall() {
        let mut incomplete = full_draft("Glow Party", 100.0);
        incomplete.feedback_score = None;
        let generator = FakeGenerator {
            drafts: vec![incomplete, full_draft("Street Play", 200.0)],
            ..FakeGenerator::default()
        };
        let catalog = vec![event("Only", 500.0, 5.0, 50, 5, 5.0, 0.5)];
        let mut request = SelectionRequest::new(1000.0);
        request.min_events = 3;

        let result = selector(&generator).select(&catalog, &request).await;

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].count, 2);
        assert_eq!(requests[0].existing_names, vec!["Only".to_string()]);
        assert_eq!(requests[0].remaining_budget, 500.0);
        assert_eq!(requests[0].per_event_budget, 250.0);

        let names: Vec<&str> = result.selected.iter().map(|s| s.event.name.as_str()).collect();
        assert_eq!(names, vec!["Only", "Street Play"]);
        assert!(result.selected[1].generated);
        assert_eq!(result.total_cost, 700.0);
        assert!(result.shortfall_message.unwrap().contains("Only 2 of the requested 3"));
    }

    #[tokio::test]
    async fn supplemental_drafts_see_shrinking_budget() {
        let generator = FakeGenerator {
            drafts: vec![
                full_draft("First", 300.0),
                full_draft("Second", 300.0),
                full_draft("Third", 150.0),
            ],
            ..FakeGenerator::default()
        };
        let catalog = vec![event("Anchor", 500.0, 5.0, 50, 5, 5.0, 0.5)];
        let mut request = SelectionRequest::new(1000.0);
        request.min_events = 3;

        let result = selector(&generator).select(&catalog, &request).await;
        let names: Vec<&str> = result.selected.iter().map(|s| s.event.name.as_str()).collect();
        assert_eq!(names, vec!["Anchor", "First", "Third"]);
        assert!(result.total_cost <= request.budget);
        assert!(result.shortfall_message.is_none());
    }

    #[tokio::test]
    async fn drafts_outside_filters_are_dropped() {
        let generator = FakeGenerator {
            drafts: vec![
                EventDraft {
                    event_type: Some("Sports".to_string()),
                    ..full_draft("Tug of War", 50.0)
                },
                EventDraft {
                    avg_positive_sentiment: Some(0.1),
                    ..full_draft("Silent Disco", 50.0)
                },
                full_draft("Open Mic", 50.0),
            ],
            ..FakeGenerator::default()
        };
        let catalog = vec![event("Anchor", 100.0, 8.0, 80, 8, 8.0, 0.9)];
        let mut request = SelectionRequest::new(1000.0);
        request.min_events = 3;
        request.constraints = FilterConstraints {
            event_types: Some(["cultural".to_string()].into_iter().collect()),
            min_popularity: None,
            min_sentiment: Some(0.5),
        };

        let result = selector(&generator).select(&catalog, &request).await;
        let names: Vec<&str> = result.selected.iter().map(|s| s.event.name.as_str()).collect();
        assert_eq!(names, vec!["Anchor", "Open Mic"]);
        assert_eq!(result.total_cost, 150.0);
        assert!(result.shortfall_message.is_some());
    }

    #[tokio::test]
    async fn generated_events_use_catalog_bounds() {
        let generator = FakeGenerator {
            drafts: vec![EventDraft {
                popularity: Some(10.0),
                attendance: Some(1000.0),
                hashtag_mentions: Some(100.0),
                feedback_score: Some(10.0),
                ..full_draft("Mega Concert", 10.0)
            }],
            ..FakeGenerator::default()
        };
        let catalog = vec![
            event("Low", 10.0, 2.0, 10, 1, 2.0, 0.5),
            event("Mid", 10.0, 4.0, 20, 2, 4.0, 0.5),
        ];
        let mut request = SelectionRequest::new(100.0);
        request.min_events = 3;

        let result = selector(&generator).select(&catalog, &request).await;
        let generated = result.selected.iter().find(|s| s.generated).unwrap();
        assert!(generated.engagement_score > 1.0);
    }

    #[tokio::test]
    async fn generator_failure_degrades_gracefully() {
        let generator = FakeGenerator {
            fail_generate: true,
            fail_describe: true,
            ..FakeGenerator::default()
        };
        let mut request = SelectionRequest::new(500.0);
        request.min_events = 4;

        let response = selector(&generator).respond(&two_event_catalog(), &request).await;
        assert_eq!(response.events_selected, 2);
        assert!(response
            .selected_events
            .iter()
            .all(|e| e.explanation == EXPLANATION_UNAVAILABLE));
        assert!(response.message.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out() {
        let generator = SlowGenerator;
        let mut request = SelectionRequest::new(120.0);
        request.min_events = 2;

        let response = selector(&generator).respond(&two_event_catalog(), &request).await;
        assert_eq!(response.events_selected, 1);
        assert_eq!(response.selected_events[0].explanation, EXPLANATION_UNAVAILABLE);
    }

    #[tokio::test]
    async fn response_values_are_rounded() {
        let generator = FakeGenerator::default();
        let catalog = vec![
            event("Precise", 1234.5678, 7.0, 70, 7, 7.0, 0.123456),
            event("Other", 10.0, 3.0, 30, 3, 3.0, 0.3),
        ];
        let response = selector(&generator)
            .respond(&catalog, &SelectionRequest::new(5000.0))
            .await;

        let first = &response.selected_events[0];
        assert_eq!(first.event, "Precise");
        assert_eq!(first.cost, 1234.57);
        assert_eq!(first.avg_sentiment, 0.123);
        assert_eq!(first.engagement_score, round_to(first.engagement_score, 4));
        assert_eq!(first.explanation, "Precise is a crowd-pleasing Cultural event.");
        assert_eq!(response.total_estimated_cost, 1244.57);
        assert!(response.message.is_none());
    }
}
