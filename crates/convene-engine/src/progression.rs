//! Progression: the per-participant stage cursor
//!
//! One state per stage id plus a terminal completed state. Advancement is
//! refused (not failed) while a group-gated stage is waiting on other
//! participants; the gate is level-triggered, so callers simply retry when
//! the public data changes.

use chrono::{DateTime, Utc};
use convene_types::{
    CompletionReason, Experiment, ParticipantProfile, PublicId, PublicStageData, StageConfig,
    StageId, StudyError, StudyResult,
};
use tracing::debug;

/// Split of active participants by whether they have submitted the answer
/// a gated stage requires.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageReadiness {
    pub ready: Vec<PublicId>,
    pub not_ready: Vec<PublicId>,
}

impl StageReadiness {
    pub fn everyone_ready(&self) -> bool {
        self.not_ready.is_empty()
    }
}

/// Outcome of an advancement attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The gate has not cleared; the cursor did not move. Presented to the
    /// UI as "waiting", not as an error.
    Waiting { not_ready: Vec<PublicId> },
    /// Cursor moved to the next stage.
    Advanced(StageId),
    /// No next stage: the participant completed the experiment.
    Completed(CompletionReason),
}

/// Classify the active participants of a stage as ready or not ready.
///
/// Ungated stages report everyone ready. Completed participants are
/// excluded entirely so a booted-out participant can never wedge a gate.
pub fn ready_for_stage(
    stage: &StageConfig,
    participants: &[ParticipantProfile],
    public_data: Option<&PublicStageData>,
) -> StageReadiness {
    let mut readiness = StageReadiness::default();

    for participant in participants.iter().filter(|p| p.is_active()) {
        let ready = if stage.kind().gates_on_group() {
            has_required_answer(public_data, &participant.public_id)
        } else {
            true
        };
        if ready {
            readiness.ready.push(participant.public_id.clone());
        } else {
            readiness.not_ready.push(participant.public_id.clone());
        }
    }

    readiness
}

fn has_required_answer(public_data: Option<&PublicStageData>, public_id: &PublicId) -> bool {
    match public_data {
        Some(PublicStageData::GroupChat {
            ready_to_end_chat, ..
        }) => ready_to_end_chat.get(public_id).copied().unwrap_or(false),
        Some(PublicStageData::VoteForLeader {
            participant_rankings,
            ..
        }) => participant_rankings.contains_key(public_id),
        // No public data yet means nobody has submitted anything.
        _ => false,
    }
}

/// The stage progression state machine.
///
/// Stateless; operates on a profile against the experiment's fixed stage
/// order.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProgressionEngine;

impl ProgressionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Attempt to advance `profile` past its current stage.
    ///
    /// The caller supplies the readiness split for the current stage
    /// (see [`ready_for_stage`]); it is only consulted for group-gated
    /// stage kinds.
    pub fn advance(
        &self,
        profile: &mut ParticipantProfile,
        experiment: &Experiment,
        current_stage: &StageConfig,
        readiness: &StageReadiness,
        now: DateTime<Utc>,
    ) -> StudyResult<AdvanceOutcome> {
        if profile.is_completed() {
            return Err(StudyError::ParticipantCompleted);
        }
        if current_stage.id != profile.current_stage_id {
            return Err(StudyError::validation(
                "currentStageId",
                "stage config does not match the participant's cursor",
            ));
        }
        if experiment.stage_index(&profile.current_stage_id).is_none() {
            return Err(StudyError::not_found(format!(
                "stage {} in experiment",
                profile.current_stage_id
            )));
        }

        if current_stage.kind().gates_on_group() && !readiness.everyone_ready() {
            debug!(
                participant = %profile.public_id,
                stage = %current_stage.id,
                waiting_on = readiness.not_ready.len(),
                "advance refused, gate not clear"
            );
            return Ok(AdvanceOutcome::Waiting {
                not_ready: readiness.not_ready.clone(),
            });
        }

        match experiment.next_stage(&profile.current_stage_id) {
            Some(next) => {
                profile.current_stage_id = next.clone();
                Ok(AdvanceOutcome::Advanced(next.clone()))
            }
            None => {
                profile.mark_completed(CompletionReason::Success, now);
                Ok(AdvanceOutcome::Completed(CompletionReason::Success))
            }
        }
    }

    /// Forced terminal transition (boot-out, attention timeout, lobby
    /// outcomes). Bypasses the sequence check; the participant's
    /// subsequent submissions must fail with `ParticipantCompleted`.
    pub fn force_complete(
        &self,
        profile: &mut ParticipantProfile,
        reason: CompletionReason,
        now: DateTime<Utc>,
    ) {
        profile.mark_completed(reason, now);
    }
}

/// Entry stage for a participant transferred out of a lobby experiment:
/// the stage after the lobby stage in the *source* experiment's order.
pub fn transfer_entry_stage(
    source_stage_ids: &[StageId],
    lobby_stage_id: &StageId,
) -> StudyResult<StageId> {
    let index = source_stage_ids
        .iter()
        .position(|id| id == lobby_stage_id)
        .ok_or_else(|| StudyError::not_found(format!("lobby stage {lobby_stage_id}")))?;
    source_stage_ids
        .get(index + 1)
        .cloned()
        .ok_or_else(|| {
            StudyError::Structural("lobby stage is the last stage of the source experiment".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use convene_types::StageSpec;
    use std::collections::BTreeMap;

    fn experiment(stages: &[&StageConfig]) -> Experiment {
        Experiment {
            name: "test".into(),
            stage_ids: stages.iter().map(|s| s.id.clone()).collect(),
            number_of_participants: 2,
            created_at: Utc::now(),
        }
    }

    fn participant(index: u32, stage: &StageConfig) -> ParticipantProfile {
        ParticipantProfile::new(PublicId::from_index(index), stage.id.clone())
    }

    #[test]
    fn advances_through_ungated_stages() {
        let info = StageConfig::new("Welcome", StageSpec::Info { info_lines: vec![] });
        let profile_stage = StageConfig::new("Profile", StageSpec::SetProfile);
        let experiment = experiment(&[&info, &profile_stage]);
        let mut profile = participant(0, &info);

        let engine = ProgressionEngine::new();
        let outcome = engine
            .advance(
                &mut profile,
                &experiment,
                &info,
                &StageReadiness::default(),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(outcome, AdvanceOutcome::Advanced(profile_stage.id.clone()));
        assert_eq!(profile.current_stage_id, profile_stage.id);
    }

    #[test]
    fn last_stage_advance_completes_with_success() {
        let info = StageConfig::new("Welcome", StageSpec::Info { info_lines: vec![] });
        let experiment = experiment(&[&info]);
        let mut profile = participant(0, &info);

        let outcome = ProgressionEngine::new()
            .advance(
                &mut profile,
                &experiment,
                &info,
                &StageReadiness::default(),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(outcome, AdvanceOutcome::Completed(CompletionReason::Success));
        assert_eq!(profile.completion, Some(CompletionReason::Success));
        assert!(profile.completed_at.is_some());
    }

    #[test]
    fn gated_stage_refuses_until_everyone_ready() {
        let chat = StageConfig::new(
            "Discussion",
            StageSpec::GroupChat {
                ratings_to_discuss: vec![],
            },
        );
        let reveal = StageConfig::new(
            "Reveal",
            StageSpec::Reveal {
                stages_to_reveal: vec![],
            },
        );
        let experiment = experiment(&[&chat, &reveal]);

        let participants = [participant(0, &chat), participant(1, &chat)];
        let public = PublicStageData::GroupChat {
            number_of_participants: 2,
            ready_to_end_chat: BTreeMap::from([(PublicId::from_index(0), true)]),
        };

        let readiness = ready_for_stage(&chat, &participants, Some(&public));
        assert_eq!(readiness.ready, vec![PublicId::from_index(0)]);
        assert_eq!(readiness.not_ready, vec![PublicId::from_index(1)]);

        let mut profile = participant(0, &chat);
        let before = profile.current_stage_id.clone();
        let outcome = ProgressionEngine::new()
            .advance(&mut profile, &experiment, &chat, &readiness, Utc::now())
            .unwrap();

        assert!(matches!(outcome, AdvanceOutcome::Waiting { ref not_ready } if not_ready.len() == 1));
        assert_eq!(profile.current_stage_id, before);

        // Second participant becomes ready; the gate clears.
        let public = PublicStageData::GroupChat {
            number_of_participants: 2,
            ready_to_end_chat: BTreeMap::from([
                (PublicId::from_index(0), true),
                (PublicId::from_index(1), true),
            ]),
        };
        let readiness = ready_for_stage(&chat, &participants, Some(&public));
        let outcome = ProgressionEngine::new()
            .advance(&mut profile, &experiment, &chat, &readiness, Utc::now())
            .unwrap();
        assert_eq!(outcome, AdvanceOutcome::Advanced(reveal.id.clone()));
    }

    #[test]
    fn completed_participants_do_not_hold_the_gate() {
        let vote = StageConfig::new("Election", StageSpec::VoteForLeader);
        let mut booted = participant(1, &vote);
        booted.mark_completed(CompletionReason::BootedOut, Utc::now());
        let participants = [participant(0, &vote), booted];

        let public = PublicStageData::VoteForLeader {
            participant_rankings: BTreeMap::from([(
                PublicId::from_index(0),
                vec![PublicId::from_index(1)],
            )]),
            current_leader: Some(PublicId::from_index(1)),
        };

        let readiness = ready_for_stage(&vote, &participants, Some(&public));
        assert!(readiness.everyone_ready());
        assert_eq!(readiness.ready.len(), 1);
    }

    #[test]
    fn advance_after_forced_completion_fails() {
        let info = StageConfig::new("Welcome", StageSpec::Info { info_lines: vec![] });
        let experiment = experiment(&[&info]);
        let mut profile = participant(0, &info);

        let engine = ProgressionEngine::new();
        engine.force_complete(&mut profile, CompletionReason::AttentionTimeout, Utc::now());

        let err = engine
            .advance(
                &mut profile,
                &experiment,
                &info,
                &StageReadiness::default(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, StudyError::ParticipantCompleted));
    }

    #[test]
    fn transfer_enters_after_the_lobby_stage() {
        let ids: Vec<StageId> = ["intro", "lobby", "task"]
            .iter()
            .map(|id| StageId::new(*id))
            .collect();

        let entry = transfer_entry_stage(&ids, &StageId::new("lobby")).unwrap();
        assert_eq!(entry, StageId::new("task"));

        assert!(matches!(
            transfer_entry_stage(&ids, &StageId::new("task")),
            Err(StudyError::Structural(_))
        ));
        assert!(matches!(
            transfer_entry_stage(&ids, &StageId::new("missing")),
            Err(StudyError::NotFound(_))
        ));
    }
}
