//! Payout configuration and the baked scoring spec
//!
//! Authoring produces [`PayoutBundle`]s; assembly converts them into
//! [`ScoringBundle`]s with the ground-truth answer per question baked in,
//! so payout computation never needs access to scoring rules.

use crate::ids::StageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Supported payout currencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayoutCurrency {
    Usd,
    Eur,
}

/// How a bundle combines its items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayoutBundleStrategy {
    /// Sum every item's amount.
    AddPayoutItems,
    /// Pay exactly one item, chosen uniformly at random at payout time.
    ChoosePayoutItem,
}

/// How an item combines its questions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayoutItemStrategy {
    /// Grade every rating question of the referenced survey.
    AddAll,
    /// Grade a single question, chosen uniformly at random at assembly
    /// time and shared by all participants.
    ChooseOne,
}

/// Authoring-time payout item: scores one survey stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub strategy: PayoutItemStrategy,
    /// The survey stage whose answers are graded.
    pub survey_stage_id: StageId,
    /// If set, grade the elected leader's answers instead of the
    /// participant's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_stage_id: Option<StageId>,
    pub fixed_currency_amount: u32,
    pub currency_amount_per_question: u32,
}

/// Authoring-time payout bundle.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutBundle {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub strategy: PayoutBundleStrategy,
    pub payout_items: Vec<PayoutItem>,
}

/// One graded question with its baked ground-truth answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringQuestion {
    pub id: u32,
    pub question_text: String,
    pub question_options: [String; 2],
    /// The correct choice, computed once at assembly time.
    pub answer: String,
}

/// Baked scoring item: amounts plus the exact questions to grade.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringItem {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub fixed_currency_amount: u32,
    pub currency_amount_per_question: u32,
    pub questions: Vec<ScoringQuestion>,
    pub survey_stage_id: StageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_stage_id: Option<StageId>,
}

/// Baked scoring bundle. Bundle-level choose-one is resolved at payout
/// time per participant, so the strategy survives baking.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringBundle {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub strategy: PayoutBundleStrategy,
    pub scoring_items: Vec<ScoringItem>,
}

/// A participant's persisted choose-one draws: bundle index to the index
/// of the item that pays out.
///
/// Committed exactly once when the payout stage is reached; payout
/// computation is deterministic given this record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutSelection {
    pub chosen_items: BTreeMap<usize, usize>,
}

/// A computed payout amount with its currency tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutAmount {
    pub currency: PayoutCurrency,
    pub amount: u32,
}
