//! Experiment metadata and the assembled authoring artifact

use crate::ids::StageId;
use crate::stage::StageConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The experiment metadata document.
///
/// `stage_ids` fixes the stage order at creation time and is the sole
/// source of truth for "next stage" during a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub name: String,
    pub stage_ids: Vec<StageId>,
    pub number_of_participants: u32,
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    /// Index of a stage in the fixed order, if present.
    pub fn stage_index(&self, stage_id: &StageId) -> Option<usize> {
        self.stage_ids.iter().position(|id| id == stage_id)
    }

    /// The stage after `stage_id`, or `None` past the end.
    pub fn next_stage(&self, stage_id: &StageId) -> Option<&StageId> {
        let index = self.stage_index(stage_id)?;
        self.stage_ids.get(index + 1)
    }
}

/// A validated, scoring-baked experiment ready to be persisted.
///
/// Produced by the assembler; consumed by `create_experiment`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentPlan {
    pub name: String,
    pub stages: Vec<StageConfig>,
    pub number_of_participants: u32,
}

impl ExperimentPlan {
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.stages.iter().map(|stage| stage.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_stage_walks_the_fixed_order() {
        let experiment = Experiment {
            name: "test".into(),
            stage_ids: vec![StageId::new("a"), StageId::new("b")],
            number_of_participants: 3,
            created_at: Utc::now(),
        };

        assert_eq!(
            experiment.next_stage(&StageId::new("a")),
            Some(&StageId::new("b"))
        );
        assert_eq!(experiment.next_stage(&StageId::new("b")), None);
        assert_eq!(experiment.next_stage(&StageId::new("missing")), None);
    }
}
