//! Public aggregation: private answers in, group-visible state out
//!
//! Every accepted submission updates only the derived fields it touches;
//! the aggregate is never rebuilt from scratch on read. Replaying all
//! historical submissions in order through [`apply_answer`] reproduces the
//! exact current aggregate, which is what crash recovery and backfill rely
//! on.
//!
//! The election leader is recomputed after every vote, not once all votes
//! are in, so `current_leader` is provisional until the election stage's
//! group gate clears. Consumers must check readiness before trusting it as
//! final.

use convene_types::{PublicId, PublicStageData, StageAnswer, StageConfig, StudyError, StudyResult};
use std::collections::BTreeMap;
use tracing::debug;

/// Fold one accepted private answer into the stage's public aggregate.
///
/// `prev` is the current aggregate (or `None` before the first
/// submission); `active_participants` is the count of non-completed
/// participants at update time, recorded on chat aggregates.
pub fn apply_answer(
    stage: &StageConfig,
    prev: Option<PublicStageData>,
    public_id: &PublicId,
    answer: &StageAnswer,
    active_participants: usize,
) -> StudyResult<PublicStageData> {
    let mut data = match prev {
        Some(data) => data,
        None => PublicStageData::empty(stage.kind()).ok_or_else(|| {
            StudyError::validation(
                "kind",
                format!("stage kind {:?} has no public data", stage.kind()),
            )
        })?,
    };

    match (&mut data, answer) {
        (
            PublicStageData::Survey {
                participant_answers,
            },
            StageAnswer::Survey { answers },
        ) => {
            overlay(participant_answers.entry(public_id.clone()).or_default(), answers);
        }
        (
            PublicStageData::LostAtSeaSurvey {
                participant_answers,
            },
            StageAnswer::LostAtSeaSurvey { answers },
        ) => {
            overlay(participant_answers.entry(public_id.clone()).or_default(), answers);
        }
        (
            PublicStageData::WtlSurvey { participant_scores },
            StageAnswer::WtlSurvey { score },
        ) => {
            participant_scores.insert(public_id.clone(), *score);
        }
        (
            PublicStageData::GroupChat {
                number_of_participants,
                ready_to_end_chat,
            },
            StageAnswer::GroupChat { ready_to_end_chat: ready },
        ) => {
            ready_to_end_chat.insert(public_id.clone(), *ready);
            *number_of_participants = active_participants;
        }
        (
            PublicStageData::VoteForLeader {
                participant_rankings,
                current_leader,
            },
            StageAnswer::VoteForLeader { rankings },
        ) => {
            participant_rankings.insert(public_id.clone(), rankings.clone());
            *current_leader = compute_leader(participant_rankings);
            debug!(
                stage = %stage.id,
                leader = ?current_leader,
                votes = participant_rankings.len(),
                "recomputed provisional leader"
            );
        }
        _ => {
            return Err(StudyError::validation(
                "kind",
                "answer kind does not match public data kind",
            ))
        }
    }

    Ok(data)
}

/// Rebuild an aggregate by replaying submissions in their original order.
///
/// Equivalent to folding each submission through [`apply_answer`]; used for
/// backfill and asserted equal to the live aggregate in tests.
pub fn replay(
    stage: &StageConfig,
    submissions: &[(PublicId, StageAnswer)],
    active_participants: usize,
) -> StudyResult<PublicStageData> {
    let mut data = None;
    for (public_id, answer) in submissions {
        data = Some(apply_answer(
            stage,
            data,
            public_id,
            answer,
            active_participants,
        )?);
    }
    data.ok_or_else(|| StudyError::validation("submissions", "no submissions to replay"))
}

/// Plurality of first-choice votes among the rankings submitted so far,
/// ties broken by lowest public id (lexicographic).
pub fn compute_leader(
    participant_rankings: &BTreeMap<PublicId, Vec<PublicId>>,
) -> Option<PublicId> {
    let mut tallies: BTreeMap<&PublicId, usize> = BTreeMap::new();
    for rankings in participant_rankings.values() {
        if let Some(first_choice) = rankings.first() {
            *tallies.entry(first_choice).or_default() += 1;
        }
    }

    // Ascending key order: the first candidate with the top tally is the
    // lexicographically lowest, which is the tie-break rule.
    let mut leader: Option<(&PublicId, usize)> = None;
    for (candidate, votes) in &tallies {
        match leader {
            Some((_, best)) if *votes <= best => {}
            _ => leader = Some((candidate, *votes)),
        }
    }
    leader.map(|(candidate, _)| candidate.clone())
}

fn overlay<V: Clone>(existing: &mut BTreeMap<u32, V>, incoming: &BTreeMap<u32, V>) {
    for (key, value) in incoming {
        existing.insert(*key, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convene_types::{RatingAnswer, RatingQuestion, StageSpec};
    use proptest::prelude::*;

    fn vote_stage() -> StageConfig {
        StageConfig::new("Election", StageSpec::VoteForLeader)
    }

    fn survey_stage() -> StageConfig {
        StageConfig::new(
            "Task",
            StageSpec::LostAtSeaSurvey {
                questions: (0..4)
                    .map(|id| RatingQuestion {
                        id,
                        question_text: "pick".into(),
                        item1: format!("item-a{id}"),
                        item2: format!("item-b{id}"),
                    })
                    .collect(),
            },
        )
    }

    fn rating(id: u32, choice: &str) -> (u32, RatingAnswer) {
        (
            id,
            RatingAnswer {
                id,
                choice: choice.into(),
            },
        )
    }

    fn vote(rankings: &[&str]) -> StageAnswer {
        StageAnswer::VoteForLeader {
            rankings: rankings.iter().map(|id| PublicId::new(*id)).collect(),
        }
    }

    #[test]
    fn survey_submissions_accumulate_per_participant() {
        let stage = survey_stage();
        let p0 = PublicId::new("p-0000");

        let first = StageAnswer::LostAtSeaSurvey {
            answers: BTreeMap::from([rating(0, "item-a0")]),
        };
        let second = StageAnswer::LostAtSeaSurvey {
            answers: BTreeMap::from([rating(0, "item-b0"), rating(1, "item-a1")]),
        };

        let data = apply_answer(&stage, None, &p0, &first, 3).unwrap();
        let data = apply_answer(&stage, Some(data), &p0, &second, 3).unwrap();

        let PublicStageData::LostAtSeaSurvey {
            participant_answers,
        } = data
        else {
            panic!("wrong aggregate kind");
        };
        let answers = &participant_answers[&p0];
        assert_eq!(answers[&0].choice, "item-b0"); // overwritten
        assert_eq!(answers[&1].choice, "item-a1"); // overlaid
    }

    #[test]
    fn leader_is_plurality_winner_with_lexicographic_tie_break() {
        let stage = vote_stage();
        // A: [p2, p1], B: [p1, p2], C: [p1, p3] => p1 leads 2-1.
        let mut data = None;
        for (voter, rankings) in [
            ("a", vec!["p2", "p1"]),
            ("b", vec!["p1", "p2"]),
            ("c", vec!["p1", "p3"]),
        ] {
            data = Some(
                apply_answer(&stage, data, &PublicId::new(voter), &vote(&rankings), 3).unwrap(),
            );
        }

        let PublicStageData::VoteForLeader { current_leader, .. } = data.unwrap() else {
            panic!("wrong aggregate kind");
        };
        assert_eq!(current_leader, Some(PublicId::new("p1")));
    }

    #[test]
    fn leader_tie_goes_to_lowest_public_id() {
        let rankings = BTreeMap::from([
            (PublicId::new("a"), vec![PublicId::new("p2")]),
            (PublicId::new("b"), vec![PublicId::new("p1")]),
        ]);
        assert_eq!(compute_leader(&rankings), Some(PublicId::new("p1")));
    }

    #[test]
    fn leader_is_provisional_and_updates_per_vote() {
        let stage = vote_stage();
        let data = apply_answer(&stage, None, &PublicId::new("a"), &vote(&["p2"]), 2).unwrap();
        let PublicStageData::VoteForLeader { ref current_leader, .. } = data else {
            panic!("wrong aggregate kind");
        };
        assert_eq!(current_leader, &Some(PublicId::new("p2")));

        let data = apply_answer(&stage, Some(data), &PublicId::new("b"), &vote(&["p1"]), 2).unwrap();
        let PublicStageData::VoteForLeader { current_leader, .. } = data else {
            panic!("wrong aggregate kind");
        };
        // Tie at one vote each; p1 wins the lexicographic tie-break.
        assert_eq!(current_leader, Some(PublicId::new("p1")));
    }

    #[test]
    fn chat_readiness_tracks_flag_and_active_count() {
        let stage = StageConfig::new(
            "Discussion",
            StageSpec::GroupChat {
                ratings_to_discuss: vec![],
            },
        );
        let p0 = PublicId::new("p-0000");

        let data = apply_answer(
            &stage,
            None,
            &p0,
            &StageAnswer::GroupChat {
                ready_to_end_chat: true,
            },
            4,
        )
        .unwrap();

        let PublicStageData::GroupChat {
            number_of_participants,
            ready_to_end_chat,
        } = data
        else {
            panic!("wrong aggregate kind");
        };
        assert_eq!(number_of_participants, 4);
        assert_eq!(ready_to_end_chat[&p0], true);
    }

    #[test]
    fn mismatched_answer_kind_is_rejected() {
        let stage = vote_stage();
        let err = apply_answer(
            &stage,
            None,
            &PublicId::new("a"),
            &StageAnswer::WtlSurvey { score: 5 },
            1,
        )
        .unwrap_err();
        assert!(matches!(err, StudyError::Validation { .. }));
    }

    proptest! {
        /// Replaying any submission history in order reproduces the
        /// incrementally maintained aggregate.
        #[test]
        fn replay_reproduces_incremental_aggregate(
            submissions in proptest::collection::vec(
                (0usize..6, 0u32..4, prop::bool::ANY),
                1..24,
            )
        ) {
            let stage = survey_stage();
            let history: Vec<(PublicId, StageAnswer)> = submissions
                .into_iter()
                .map(|(participant, question, first_item)| {
                    let item = if first_item {
                        format!("item-a{question}")
                    } else {
                        format!("item-b{question}")
                    };
                    (
                        PublicId::from_index(participant as u32),
                        StageAnswer::LostAtSeaSurvey {
                            answers: BTreeMap::from([(
                                question,
                                RatingAnswer { id: question, choice: item },
                            )]),
                        },
                    )
                })
                .collect();

            let mut live = None;
            for (public_id, answer) in &history {
                live = Some(apply_answer(&stage, live, public_id, answer, 6).unwrap());
            }

            let replayed = replay(&stage, &history, 6).unwrap();
            prop_assert_eq!(live.unwrap(), replayed);
        }
    }
}
