//! Stage configuration: the closed set of stage kinds and their payloads

use crate::ids::StageId;
use crate::payout::{PayoutBundle, PayoutCurrency, ScoringBundle};
use serde::{Deserialize, Serialize};

/// The closed set of stage kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageKind {
    Info,
    TermsOfService,
    SetProfile,
    #[serde(rename = "survey")]
    TakeSurvey,
    LostAtSeaSurvey,
    WtlSurvey,
    GroupChat,
    VoteForLeader,
    Payout,
    Reveal,
}

impl StageKind {
    /// Whether submissions to this stage feed a shared public aggregate.
    pub fn has_public_data(self) -> bool {
        matches!(
            self,
            Self::TakeSurvey
                | Self::LostAtSeaSurvey
                | Self::WtlSurvey
                | Self::GroupChat
                | Self::VoteForLeader
        )
    }

    /// Whether leaving this stage is gated on every active participant
    /// having submitted the required answer.
    pub fn gates_on_group(self) -> bool {
        matches!(self, Self::GroupChat | Self::VoteForLeader)
    }

    /// Whether participants can submit a `StageAnswer` for this stage.
    /// Profile and ToS results land on the participant profile instead.
    pub fn accepts_answers(self) -> bool {
        self.has_public_data()
    }
}

/// A survey question. Ids are unique within one survey stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum QuestionConfig {
    Text {
        id: u32,
        question_text: String,
    },
    MultipleChoice {
        id: u32,
        question_text: String,
        options: Vec<String>,
    },
    Scale {
        id: u32,
        question_text: String,
        lower_bound: String,
        upper_bound: String,
    },
    Rating {
        id: u32,
        question_text: String,
        item1: String,
        item2: String,
    },
}

impl QuestionConfig {
    pub fn id(&self) -> u32 {
        match self {
            Self::Text { id, .. }
            | Self::MultipleChoice { id, .. }
            | Self::Scale { id, .. }
            | Self::Rating { id, .. } => *id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::MultipleChoice { .. } => "multipleChoice",
            Self::Scale { .. } => "scale",
            Self::Rating { .. } => "rating",
        }
    }
}

/// A participant's answer to one survey question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum QuestionAnswer {
    Text { id: u32, answer: String },
    MultipleChoice { id: u32, choice: usize },
    Scale { id: u32, score: u32 },
    Rating { id: u32, choice: String },
}

impl QuestionAnswer {
    pub fn id(&self) -> u32 {
        match self {
            Self::Text { id, .. }
            | Self::MultipleChoice { id, .. }
            | Self::Scale { id, .. }
            | Self::Rating { id, .. } => *id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::MultipleChoice { .. } => "multipleChoice",
            Self::Scale { .. } => "scale",
            Self::Rating { .. } => "rating",
        }
    }
}

/// An item-pair rating question (Lost-at-Sea style survival ranking).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingQuestion {
    pub id: u32,
    pub question_text: String,
    pub item1: String,
    pub item2: String,
}

/// Answer to a [`RatingQuestion`]: which of the two items was chosen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingAnswer {
    pub id: u32,
    pub choice: String,
}

/// An item pair queued for group-chat discussion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPair {
    pub item1: String,
    pub item2: String,
}

/// Kind-specific stage payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StageSpec {
    Info {
        info_lines: Vec<String>,
    },
    TermsOfService {
        tos_lines: Vec<String>,
    },
    SetProfile,
    #[serde(rename = "survey")]
    TakeSurvey {
        questions: Vec<QuestionConfig>,
    },
    LostAtSeaSurvey {
        questions: Vec<RatingQuestion>,
    },
    WtlSurvey {
        question_text: String,
        lower_bound: String,
        upper_bound: String,
    },
    GroupChat {
        ratings_to_discuss: Vec<ItemPair>,
    },
    VoteForLeader,
    Payout {
        currency: PayoutCurrency,
        payouts: Vec<PayoutBundle>,
        /// Baked at assembly time from `payouts` + the referenced survey
        /// stages. Empty only before assembly.
        #[serde(default)]
        scoring: Vec<ScoringBundle>,
    },
    Reveal {
        stages_to_reveal: Vec<StageId>,
    },
}

impl StageSpec {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Info { .. } => StageKind::Info,
            Self::TermsOfService { .. } => StageKind::TermsOfService,
            Self::SetProfile => StageKind::SetProfile,
            Self::TakeSurvey { .. } => StageKind::TakeSurvey,
            Self::LostAtSeaSurvey { .. } => StageKind::LostAtSeaSurvey,
            Self::WtlSurvey { .. } => StageKind::WtlSurvey,
            Self::GroupChat { .. } => StageKind::GroupChat,
            Self::VoteForLeader => StageKind::VoteForLeader,
            Self::Payout { .. } => StageKind::Payout,
            Self::Reveal { .. } => StageKind::Reveal,
        }
    }
}

/// Immutable configuration for one stage of an experiment.
///
/// Created at authoring time and never mutated after publish.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub id: StageId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popup_text: Option<String>,
    #[serde(flatten)]
    pub spec: StageSpec,
}

impl StageConfig {
    pub fn new(name: impl Into<String>, spec: StageSpec) -> Self {
        Self {
            id: StageId::generate(),
            name: name.into(),
            description: None,
            popup_text: None,
            spec,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_popup_text(mut self, popup_text: impl Into<String>) -> Self {
        self.popup_text = Some(popup_text.into());
        self
    }

    pub fn kind(&self) -> StageKind {
        self.spec.kind()
    }
}
