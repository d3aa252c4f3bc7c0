//! Keyword batch pipeline for KeywordKit.
//!
//! Normalization, topic classification, outline and post-idea synthesis,
//! and the end-to-end [`pipeline::run_batch`] that renders the report.

pub mod classify;
pub mod ideas;
pub mod normalize;
pub mod outline;
pub mod pipeline;

pub use classify::TopicClassifier;
pub use ideas::generate_post_ideas;
pub use normalize::normalize;
pub use outline::synthesize_outline;
pub use pipeline::{BatchRequest, ProgressReporter, SilentProgress, run_batch};
