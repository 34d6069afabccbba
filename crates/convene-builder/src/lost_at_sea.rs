//! The Lost-at-Sea leader-election game.
//!
//! Participants rank survival item pairs alone, discuss them as a group,
//! rank again, elect a leader, and the leader ranks a fresh set of pairs
//! on the group's behalf. Payout pays the initial task plus, by a
//! one-in-two draw, either the participant's updated answers or the
//! leader's.

use crate::assembly::assemble;
use crate::items::sample_pairs;
use crate::stages::{
    chat_stage, info_stage, lost_at_sea_survey_stage, payout_stage, profile_stage, reveal_stage,
    survey_stage, tos_stage, vote_for_leader_stage, wtl_survey_stage,
};
use convene_types::{
    ExperimentPlan, ItemPair, PayoutBundle, PayoutBundleStrategy, PayoutCurrency, PayoutItem,
    PayoutItemStrategy, QuestionConfig, StudyResult,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Item pairs per ranking task.
pub const PAIRS_PER_TASK: usize = 5;

/// Build the full staged game. Deterministic for a fixed seed: the same
/// seed yields the same sampled pairs and the same choose-one draws.
pub fn lost_at_sea_game(number_of_participants: u32, seed: u64) -> StudyResult<ExperimentPlan> {
    let mut rng = StdRng::seed_from_u64(seed);

    let intro = info_stage(
        "Welcome aboard",
        vec![
            "You and your crewmates have chartered a yacht across the Atlantic.".to_string(),
            "A fire has broken out and the yacht is sinking. You must choose what to salvage."
                .to_string(),
        ],
    );
    let tos = tos_stage(vec![
        "Please respect your fellow crewmates in the group discussion.".to_string(),
    ]);
    let profile = profile_stage();

    let task_questions = sample_pairs(PAIRS_PER_TASK, &mut rng)?;
    let discussion_pairs: Vec<ItemPair> = task_questions
        .iter()
        .map(|question| ItemPair {
            item1: question.item1.clone(),
            item2: question.item2.clone(),
        })
        .collect();

    let initial_task = lost_at_sea_survey_stage("Initial survival task", task_questions.clone());
    let wtl = wtl_survey_stage();
    let discussion = chat_stage("Group discussion", discussion_pairs);
    // Same pairs after discussion, so leaders can be judged on improvement.
    let updated_task = lost_at_sea_survey_stage("Updated survival task", task_questions);
    let election = vote_for_leader_stage("Leader election");
    let leader_task =
        lost_at_sea_survey_stage("Leader survival task", sample_pairs(PAIRS_PER_TASK, &mut rng)?);
    let reveal = reveal_stage(
        "Election results",
        vec![election.id.clone(), leader_task.id.clone()],
    );

    let payout = payout_stage(
        "Payout",
        PayoutCurrency::Usd,
        vec![
            PayoutBundle {
                name: "Part 1".to_string(),
                description: "One randomly selected question from your initial task".to_string(),
                strategy: PayoutBundleStrategy::AddPayoutItems,
                payout_items: vec![PayoutItem {
                    name: "Initial task".to_string(),
                    description: String::new(),
                    strategy: PayoutItemStrategy::ChooseOne,
                    survey_stage_id: initial_task.id.clone(),
                    leader_stage_id: None,
                    fixed_currency_amount: 3,
                    currency_amount_per_question: 2,
                }],
            },
            PayoutBundle {
                name: "Parts 2 and 3".to_string(),
                description: "Either your updated answers or your elected leader's answers"
                    .to_string(),
                strategy: PayoutBundleStrategy::ChoosePayoutItem,
                payout_items: vec![
                    PayoutItem {
                        name: "Updated task".to_string(),
                        description: String::new(),
                        strategy: PayoutItemStrategy::AddAll,
                        survey_stage_id: updated_task.id.clone(),
                        leader_stage_id: None,
                        fixed_currency_amount: 6,
                        currency_amount_per_question: 2,
                    },
                    PayoutItem {
                        name: "Leader task".to_string(),
                        description: String::new(),
                        strategy: PayoutItemStrategy::AddAll,
                        survey_stage_id: leader_task.id.clone(),
                        leader_stage_id: Some(election.id.clone()),
                        fixed_currency_amount: 6,
                        currency_amount_per_question: 2,
                    },
                ],
            },
        ],
    );

    let exit_survey = survey_stage(
        "Final survey",
        vec![
            QuestionConfig::Scale {
                id: 0,
                question_text: "How satisfied are you with the group's final answers?".to_string(),
                lower_bound: "Not at all".to_string(),
                upper_bound: "Very satisfied".to_string(),
            },
            QuestionConfig::Text {
                id: 1,
                question_text: "Any feedback on the experiment?".to_string(),
            },
        ],
    );

    assemble(
        "Lost at Sea",
        vec![
            intro,
            tos,
            profile,
            initial_task,
            wtl,
            discussion,
            updated_task,
            election,
            leader_task,
            reveal,
            payout,
            exit_survey,
        ],
        number_of_participants,
        &mut rng,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use convene_types::{StageKind, StageSpec};

    #[test]
    fn game_assembles_with_the_full_stage_sequence() {
        let plan = lost_at_sea_game(3, 42).unwrap();
        assert_eq!(plan.number_of_participants, 3);

        let kinds: Vec<StageKind> = plan.stages.iter().map(|stage| stage.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Info,
                StageKind::TermsOfService,
                StageKind::SetProfile,
                StageKind::LostAtSeaSurvey,
                StageKind::WtlSurvey,
                StageKind::GroupChat,
                StageKind::LostAtSeaSurvey,
                StageKind::VoteForLeader,
                StageKind::LostAtSeaSurvey,
                StageKind::Reveal,
                StageKind::Payout,
                StageKind::TakeSurvey,
            ]
        );
    }

    #[test]
    fn payout_scoring_is_baked() {
        let plan = lost_at_sea_game(3, 42).unwrap();
        let payout = plan
            .stages
            .iter()
            .find(|stage| stage.kind() == StageKind::Payout)
            .unwrap();
        let StageSpec::Payout { scoring, .. } = &payout.spec else {
            panic!("payout spec expected");
        };

        assert_eq!(scoring.len(), 2);
        // Choose-one initial-task item reduced to a single shared question.
        assert_eq!(scoring[0].scoring_items[0].questions.len(), 1);
        // The alternative bundle grades full tasks.
        assert_eq!(scoring[1].scoring_items.len(), 2);
        assert_eq!(scoring[1].scoring_items[0].questions.len(), PAIRS_PER_TASK);
        assert!(scoring[1].scoring_items[1].leader_stage_id.is_some());
    }

    #[test]
    fn same_seed_builds_the_same_game() {
        let first = lost_at_sea_game(3, 7).unwrap();
        let second = lost_at_sea_game(3, 7).unwrap();

        let questions = |plan: &ExperimentPlan| -> Vec<String> {
            plan.stages
                .iter()
                .filter_map(|stage| match &stage.spec {
                    StageSpec::LostAtSeaSurvey { questions } => Some(
                        questions
                            .iter()
                            .map(|q| format!("{}|{}", q.item1, q.item2))
                            .collect::<Vec<_>>(),
                    ),
                    _ => None,
                })
                .flatten()
                .collect()
        };
        assert_eq!(questions(&first), questions(&second));
    }
}
