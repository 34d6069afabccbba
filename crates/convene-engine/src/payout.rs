//! Payout computation: deterministic scoring of recorded answers
//!
//! `amount = fixed_currency_amount + currency_amount_per_question × correct`
//! per item, combined per bundle by its strategy. Choose-one bundle draws
//! are made once via [`draw_selection`], persisted, and reused; computation
//! itself holds no randomness, so repeat calls with the same persisted
//! selection yield the same amount.

use convene_types::{
    PayoutAmount, PayoutBundleStrategy, PayoutCurrency, PayoutSelection, PublicId, ScoringBundle,
    ScoringItem, StageId, StudyError, StudyResult,
};
use rand::Rng;
use tracing::debug;

/// Read access to the recorded choices payout computation grades.
///
/// Decouples the computation from storage: the store layer implements this
/// over public stage data, tests implement it over plain maps.
pub trait AnswerSource {
    /// The computing participant's own recorded choice for a rating
    /// question of a survey stage.
    fn own_choice(&self, survey_stage: &StageId, question_id: u32) -> Option<String>;

    /// The elected leader of an election stage, if one is determined.
    fn leader_of(&self, election_stage: &StageId) -> Option<PublicId>;

    /// Any participant's recorded choice, looked up by public id (used to
    /// grade the leader's answers).
    fn participant_choice(
        &self,
        participant: &PublicId,
        survey_stage: &StageId,
        question_id: u32,
    ) -> Option<String>;
}

/// Draw the choose-one item per bundle, uniformly at random.
///
/// Called once when a participant reaches the payout stage; the result is
/// persisted and never re-rolled.
pub fn draw_selection(scoring: &[ScoringBundle], rng: &mut impl Rng) -> PayoutSelection {
    let mut selection = PayoutSelection::default();
    for (bundle_index, bundle) in scoring.iter().enumerate() {
        if bundle.strategy == PayoutBundleStrategy::ChoosePayoutItem
            && !bundle.scoring_items.is_empty()
        {
            let item_index = rng.gen_range(0..bundle.scoring_items.len());
            selection.chosen_items.insert(bundle_index, item_index);
        }
    }
    selection
}

/// Compute the payout amount for one participant.
///
/// Fails with `IncompleteDependency` if an item grades an elected leader
/// whose election has not resolved, or if a choose-one bundle has no
/// persisted draw. Unanswered questions count as incorrect.
pub fn compute_payout(
    currency: PayoutCurrency,
    scoring: &[ScoringBundle],
    selection: &PayoutSelection,
    answers: &impl AnswerSource,
) -> StudyResult<PayoutAmount> {
    let mut amount = 0u32;

    for (bundle_index, bundle) in scoring.iter().enumerate() {
        match bundle.strategy {
            PayoutBundleStrategy::AddPayoutItems => {
                for item in &bundle.scoring_items {
                    amount += item_amount(item, answers)?;
                }
            }
            PayoutBundleStrategy::ChoosePayoutItem => {
                let item_index =
                    *selection.chosen_items.get(&bundle_index).ok_or_else(|| {
                        StudyError::IncompleteDependency(format!(
                            "no persisted draw for choose-one bundle `{}`",
                            bundle.name
                        ))
                    })?;
                let item = bundle.scoring_items.get(item_index).ok_or_else(|| {
                    StudyError::Structural(format!(
                        "persisted draw {item_index} out of range for bundle `{}`",
                        bundle.name
                    ))
                })?;
                amount += item_amount(item, answers)?;
            }
        }
    }

    debug!(amount, ?currency, "computed payout");
    Ok(PayoutAmount { currency, amount })
}

fn item_amount(item: &ScoringItem, answers: &impl AnswerSource) -> StudyResult<u32> {
    // Grade the leader's answers when the item names an election stage.
    let leader = match &item.leader_stage_id {
        Some(election_stage) => Some(answers.leader_of(election_stage).ok_or_else(|| {
            StudyError::IncompleteDependency(format!(
                "election {election_stage} has no determined leader"
            ))
        })?),
        None => None,
    };

    let correct = item
        .questions
        .iter()
        .filter(|question| {
            let choice = match &leader {
                Some(leader) => {
                    answers.participant_choice(leader, &item.survey_stage_id, question.id)
                }
                None => answers.own_choice(&item.survey_stage_id, question.id),
            };
            choice.as_deref() == Some(question.answer.as_str())
        })
        .count() as u32;

    Ok(item.fixed_currency_amount + item.currency_amount_per_question * correct)
}
