//! Participant profiles and completion states

use crate::ids::{ExperimentId, ParticipantId, PublicId, StageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a participant's run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionReason {
    /// Reached the end of the stage sequence.
    Success,
    /// Failed an attention check.
    AttentionTimeout,
    /// Timed out waiting in a lobby.
    LobbyTimeout,
    /// Declined a lobby transfer.
    LobbyDeclined,
    /// Removed by the experimenter.
    BootedOut,
}

/// Where a transferred participant came from or went to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    pub experiment_id: ExperimentId,
    pub participant_id: ParticipantId,
}

/// Mutable profile fields a participant may set themselves.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronouns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_tos_at: Option<DateTime<Utc>>,
}

/// One participant's state within an experiment.
///
/// `current_stage_id` is the progression cursor. Invariant: once set it
/// always references a stage in the owning experiment's stage list, or the
/// participant is completed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    pub public_id: PublicId,
    pub current_stage_id: StageId,
    pub name: Option<String>,
    pub pronouns: Option<String>,
    pub avatar_url: Option<String>,
    pub accept_tos_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completion: Option<CompletionReason>,
    pub transfer: Option<TransferConfig>,
}

impl ParticipantProfile {
    pub fn new(public_id: PublicId, first_stage: StageId) -> Self {
        Self {
            public_id,
            current_stage_id: first_stage,
            name: None,
            pronouns: None,
            avatar_url: None,
            accept_tos_at: None,
            completed_at: None,
            completion: None,
            transfer: None,
        }
    }

    /// Still progressing through the experiment.
    pub fn is_active(&self) -> bool {
        self.completed_at.is_none()
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Terminal transition. Stamps the completion timestamp and reason;
    /// idempotent for the same reason, first reason wins.
    pub fn mark_completed(&mut self, reason: CompletionReason, at: DateTime<Utc>) {
        if self.completed_at.is_none() {
            self.completed_at = Some(at);
            self.completion = Some(reason);
        }
    }

    pub fn apply_update(&mut self, update: ProfileUpdate) {
        if let Some(name) = update.name {
            self.name = Some(name);
        }
        if let Some(pronouns) = update.pronouns {
            self.pronouns = Some(pronouns);
        }
        if let Some(avatar_url) = update.avatar_url {
            self.avatar_url = Some(avatar_url);
        }
        if let Some(accept_tos_at) = update.accept_tos_at {
            self.accept_tos_at = Some(accept_tos_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_sticky() {
        let mut profile = ParticipantProfile::new(PublicId::from_index(0), StageId::new("s0"));
        assert!(profile.is_active());

        let first = Utc::now();
        profile.mark_completed(CompletionReason::BootedOut, first);
        profile.mark_completed(CompletionReason::Success, Utc::now());

        assert_eq!(profile.completion, Some(CompletionReason::BootedOut));
        assert_eq!(profile.completed_at, Some(first));
        assert!(!profile.is_active());
    }

    #[test]
    fn profile_update_only_touches_set_fields() {
        let mut profile = ParticipantProfile::new(PublicId::from_index(1), StageId::new("s0"));
        profile.pronouns = Some("they/them".into());

        profile.apply_update(ProfileUpdate {
            name: Some("Ada".into()),
            ..Default::default()
        });

        assert_eq!(profile.name.as_deref(), Some("Ada"));
        assert_eq!(profile.pronouns.as_deref(), Some("they/them"));
    }
}
