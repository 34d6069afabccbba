//! Document paths
//!
//! Typed builders over the document layout:
//!
//! ```text
//! experiments/{e}
//! experiments/{e}/stages/{s}
//! experiments/{e}/publicStageData/{s}
//! experiments/{e}/participants/{p}
//! experiments/{e}/participants/{p}/stages/{s}
//! experiments/{e}/participants/{p}/payouts/{s}
//! ```

use convene_types::{ExperimentId, ParticipantId, StageId};
use std::fmt;

/// Path of a document (or document subtree) in the store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath(Vec<String>);

impl DocPath {
    pub fn root(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether `self` lies strictly under `prefix`.
    pub fn is_under(&self, prefix: &DocPath) -> bool {
        self.0.len() > prefix.0.len() && self.0.starts_with(&prefix.0)
    }

    /// Whether `self` is a direct child of `prefix`.
    pub fn is_child_of(&self, prefix: &DocPath) -> bool {
        self.0.len() == prefix.0.len() + 1 && self.0.starts_with(&prefix.0)
    }

    /// The final path segment (the document id).
    pub fn leaf(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }

    // ── Layout builders ──────────────────────────────────────────────

    pub fn experiment(experiment: &ExperimentId) -> Self {
        Self::root("experiments").child(experiment.as_str())
    }

    pub fn stage(experiment: &ExperimentId, stage: &StageId) -> Self {
        Self::experiment(experiment)
            .child("stages")
            .child(stage.as_str())
    }

    pub fn public_stage_data(experiment: &ExperimentId, stage: &StageId) -> Self {
        Self::experiment(experiment)
            .child("publicStageData")
            .child(stage.as_str())
    }

    pub fn participants(experiment: &ExperimentId) -> Self {
        Self::experiment(experiment).child("participants")
    }

    pub fn participant(experiment: &ExperimentId, participant: &ParticipantId) -> Self {
        Self::participants(experiment).child(participant.as_str())
    }

    pub fn stage_answers(experiment: &ExperimentId, participant: &ParticipantId) -> Self {
        Self::participant(experiment, participant).child("stages")
    }

    pub fn stage_answer(
        experiment: &ExperimentId,
        participant: &ParticipantId,
        stage: &StageId,
    ) -> Self {
        Self::stage_answers(experiment, participant).child(stage.as_str())
    }

    pub fn payout_selection(
        experiment: &ExperimentId,
        participant: &ParticipantId,
        stage: &StageId,
    ) -> Self {
        Self::participant(experiment, participant)
            .child("payouts")
            .child(stage.as_str())
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}
