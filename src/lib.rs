//! Budget-constrained event selection for college fests.
//!
//! Review comments are matched to catalog events and classified for
//! sentiment (`prepare`), then a budget request picks a ranked, affordable
//! set of events (`selector`), optionally topped up by an LLM generator.

pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod llm;
pub mod matcher;
pub mod models;
pub mod prepare;
pub mod scoring;
pub mod selector;

pub use error::{PlannerError, Result};
pub use llm::{GenerationRequest, Generator, LlmBackend};
pub use models::{Event, EventDraft, FilterConstraints, SelectionRequest, SelectionResponse};
pub use selector::{EventSelector, SelectionContext};
