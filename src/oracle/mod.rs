//! Client and contract for the external question oracle.
//!
//! The oracle generates the next diagnostic question, classifies first-stage
//! answers into a disorder label, extracts candidate symptoms and reports the
//! stage size tables. Every failure is reported as an [`OracleError`]; a
//! failed call is never confused with the `unknown` question kind.
//!
//! [`OracleError`]: crate::error::OracleError

mod client;
mod types;


pub use client::OracleClient;
pub use types::*;

use async_trait::async_trait;

use crate::error::OracleResult;

/// Operations the session state machine needs from the oracle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Generate the question at `index`, optionally with the prior answer as context.
    async fn generate_question(
        &self,
        index: u32,
        prior_answer: &str,
        disorder_key: &str,
        question_set: &str,
    ) -> OracleResult<GeneratedQuestion>;

    /// Classify the answers collected so far. `0` means no disorder.
    async fn classify_first_stage(&self, answers: &[String]) -> OracleResult<i64>;

    /// Extract candidate symptoms from later-stage answers.
    async fn extract_symptoms(
        &self,
        answers: &[String],
        disorder: i64,
    ) -> OracleResult<Vec<SymptomCandidate>>;

    /// Stage size tables.
    async fn stage_limits(&self) -> OracleResult<StageLimits>;
}
