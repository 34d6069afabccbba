//! Structural validation and the scoring bake.

use crate::items::pair_answer;
use convene_types::{
    ExperimentPlan, PayoutBundle, PayoutBundleStrategy, PayoutItem, PayoutItemStrategy,
    QuestionConfig, RatingQuestion, ScoringBundle, ScoringItem, ScoringQuestion, StageConfig,
    StageId, StageKind, StageSpec, StudyError, StudyResult,
};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Validate a stage sequence and bake its scoring specs into an
/// [`ExperimentPlan`] ready to persist.
///
/// Validation is fail-fast: the first structural problem aborts assembly.
/// The rng drives the choose-one question draws, which are shared by all
/// participants of the assembled experiment.
pub fn assemble(
    name: impl Into<String>,
    stages: Vec<StageConfig>,
    number_of_participants: u32,
    rng: &mut impl Rng,
) -> StudyResult<ExperimentPlan> {
    validate_structure(&stages)?;
    let stages = bake_scoring(stages, rng)?;
    let plan = ExperimentPlan {
        name: name.into(),
        stages,
        number_of_participants,
    };
    debug!(name = %plan.name, stages = plan.stages.len(), "assembled experiment plan");
    Ok(plan)
}

fn validate_structure(stages: &[StageConfig]) -> StudyResult<()> {
    if stages.is_empty() {
        return Err(StudyError::Structural(
            "an experiment needs at least one stage".into(),
        ));
    }
    let mut seen = BTreeSet::new();
    for stage in stages {
        if !seen.insert(&stage.id) {
            return Err(StudyError::Structural(format!(
                "duplicate stage id {}",
                stage.id
            )));
        }
    }
    let index_of: BTreeMap<&StageId, usize> = stages
        .iter()
        .enumerate()
        .map(|(index, stage)| (&stage.id, index))
        .collect();

    for (position, stage) in stages.iter().enumerate() {
        match &stage.spec {
            StageSpec::Payout { payouts, .. } => {
                for bundle in payouts {
                    validate_bundle(stages, &index_of, position, bundle)?;
                }
            }
            StageSpec::Reveal { stages_to_reveal } => {
                let mut elections = 0;
                for revealed in stages_to_reveal {
                    let index = resolve_earlier(stages, &index_of, position, revealed, &[], "revealed")?;
                    if stages[index].kind() == StageKind::VoteForLeader {
                        elections += 1;
                    }
                }
                if elections != 1 {
                    return Err(StudyError::Structural(format!(
                        "reveal stage `{}` must reference exactly one election stage",
                        stage.name
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_bundle(
    stages: &[StageConfig],
    index_of: &BTreeMap<&StageId, usize>,
    position: usize,
    bundle: &PayoutBundle,
) -> StudyResult<()> {
    if bundle.strategy == PayoutBundleStrategy::ChoosePayoutItem && bundle.payout_items.is_empty()
    {
        return Err(StudyError::Structural(format!(
            "choose-one bundle `{}` has no items to draw from",
            bundle.name
        )));
    }
    for item in &bundle.payout_items {
        resolve_earlier(
            stages,
            index_of,
            position,
            &item.survey_stage_id,
            &[StageKind::LostAtSeaSurvey, StageKind::TakeSurvey],
            "survey",
        )?;
        if let Some(election) = &item.leader_stage_id {
            resolve_earlier(
                stages,
                index_of,
                position,
                election,
                &[StageKind::VoteForLeader],
                "election",
            )?;
        }
    }
    Ok(())
}

/// Resolve a stage reference that must point at an earlier stage, and, if
/// `expected` is non-empty, at one of the expected kinds.
fn resolve_earlier(
    stages: &[StageConfig],
    index_of: &BTreeMap<&StageId, usize>,
    position: usize,
    reference: &StageId,
    expected: &[StageKind],
    role: &str,
) -> StudyResult<usize> {
    let index = *index_of.get(reference).ok_or_else(|| {
        StudyError::Structural(format!("{role} stage {reference} does not exist"))
    })?;
    if index >= position {
        return Err(StudyError::Structural(format!(
            "{role} stage {reference} must come before the stage that references it"
        )));
    }
    let kind = stages[index].kind();
    if !expected.is_empty() && !expected.contains(&kind) {
        return Err(StudyError::Structural(format!(
            "{role} stage {reference} has kind {kind:?}"
        )));
    }
    Ok(index)
}

fn bake_scoring(
    stages: Vec<StageConfig>,
    rng: &mut impl Rng,
) -> StudyResult<Vec<StageConfig>> {
    // Rating questions per survey stage, gathered before any payload moves.
    let mut rating_questions: BTreeMap<StageId, Vec<RatingQuestion>> = BTreeMap::new();
    for stage in &stages {
        match &stage.spec {
            StageSpec::LostAtSeaSurvey { questions } => {
                rating_questions.insert(stage.id.clone(), questions.clone());
            }
            StageSpec::TakeSurvey { questions } => {
                let ratings: Vec<RatingQuestion> = questions
                    .iter()
                    .filter_map(|question| match question {
                        QuestionConfig::Rating {
                            id,
                            question_text,
                            item1,
                            item2,
                        } => Some(RatingQuestion {
                            id: *id,
                            question_text: question_text.clone(),
                            item1: item1.clone(),
                            item2: item2.clone(),
                        }),
                        _ => None,
                    })
                    .collect();
                if !ratings.is_empty() {
                    rating_questions.insert(stage.id.clone(), ratings);
                }
            }
            _ => {}
        }
    }

    stages
        .into_iter()
        .map(|mut stage| {
            if let StageSpec::Payout {
                payouts, scoring, ..
            } = &mut stage.spec
            {
                *scoring = payouts
                    .iter()
                    .map(|bundle| bake_bundle(bundle, &rating_questions, rng))
                    .collect::<StudyResult<Vec<_>>>()?;
            }
            Ok(stage)
        })
        .collect()
}

fn bake_bundle(
    bundle: &PayoutBundle,
    rating_questions: &BTreeMap<StageId, Vec<RatingQuestion>>,
    rng: &mut impl Rng,
) -> StudyResult<ScoringBundle> {
    let scoring_items = bundle
        .payout_items
        .iter()
        .map(|item| bake_item(item, rating_questions, rng))
        .collect::<StudyResult<Vec<_>>>()?;
    Ok(ScoringBundle {
        name: bundle.name.clone(),
        description: bundle.description.clone(),
        strategy: bundle.strategy,
        scoring_items,
    })
}

fn bake_item(
    item: &PayoutItem,
    rating_questions: &BTreeMap<StageId, Vec<RatingQuestion>>,
    rng: &mut impl Rng,
) -> StudyResult<ScoringItem> {
    let ratings = rating_questions
        .get(&item.survey_stage_id)
        .cloned()
        .unwrap_or_default();
    let mut questions = ratings
        .iter()
        .map(|question| {
            Ok(ScoringQuestion {
                id: question.id,
                question_text: question.question_text.clone(),
                question_options: [question.item1.clone(), question.item2.clone()],
                answer: pair_answer(&question.item1, &question.item2)?,
            })
        })
        .collect::<StudyResult<Vec<_>>>()?;

    if item.strategy == PayoutItemStrategy::ChooseOne && questions.len() > 1 {
        let chosen = rng.gen_range(0..questions.len());
        questions = vec![questions.swap_remove(chosen)];
    }

    Ok(ScoringItem {
        name: item.name.clone(),
        description: item.description.clone(),
        fixed_currency_amount: item.fixed_currency_amount,
        currency_amount_per_question: item.currency_amount_per_question,
        questions,
        survey_stage_id: item.survey_stage_id.clone(),
        leader_stage_id: item.leader_stage_id.clone(),
    })
}
