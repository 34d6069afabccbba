//! Stage registry: structural answer validation
//!
//! Pure checks of an answer against its stage configuration. No side
//! effects; policy checks (duplicate votes, completed participants) live
//! in the store layer.

use crate::answer::StageAnswer;
use crate::errors::{StudyError, StudyResult};
use crate::stage::{QuestionConfig, StageConfig, StageSpec};
use std::collections::HashSet;

/// Validate `answer` against `stage`.
///
/// Rejects kind mismatches, survey answers referencing question ids not in
/// the config (or answering with the wrong question kind), and empty or
/// duplicated election rankings. The error names the offending field path.
pub fn validate_answer(stage: &StageConfig, answer: &StageAnswer) -> StudyResult<()> {
    if !stage.kind().accepts_answers() {
        return Err(StudyError::validation(
            "kind",
            format!("stage kind {:?} does not accept answers", stage.kind()),
        ));
    }
    if answer.kind() != stage.kind() {
        return Err(StudyError::validation(
            "kind",
            format!(
                "answer kind {:?} does not match stage kind {:?}",
                answer.kind(),
                stage.kind()
            ),
        ));
    }

    match (&stage.spec, answer) {
        (StageSpec::TakeSurvey { questions }, StageAnswer::Survey { answers }) => {
            for (key, question_answer) in answers {
                let path = format!("answers.{key}");
                if *key != question_answer.id() {
                    return Err(StudyError::validation(path, "key does not match answer id"));
                }
                let config = questions
                    .iter()
                    .find(|question| question.id() == question_answer.id())
                    .ok_or_else(|| {
                        StudyError::validation(&path, "no such question in stage config")
                    })?;
                if config.kind_name() != question_answer.kind_name() {
                    return Err(StudyError::validation(path, "question kind mismatch"));
                }
                validate_question_answer(config, question_answer, &format!("answers.{key}"))?;
            }
            Ok(())
        }
        (StageSpec::LostAtSeaSurvey { questions }, StageAnswer::LostAtSeaSurvey { answers }) => {
            for (key, rating) in answers {
                let path = format!("answers.{key}");
                if *key != rating.id {
                    return Err(StudyError::validation(path, "key does not match answer id"));
                }
                let question = questions
                    .iter()
                    .find(|question| question.id == rating.id)
                    .ok_or_else(|| {
                        StudyError::validation(&path, "no such question in stage config")
                    })?;
                if rating.choice != question.item1 && rating.choice != question.item2 {
                    return Err(StudyError::validation(
                        format!("{path}.choice"),
                        "choice is not one of the paired items",
                    ));
                }
            }
            Ok(())
        }
        (StageSpec::WtlSurvey { .. }, StageAnswer::WtlSurvey { .. }) => Ok(()),
        (StageSpec::GroupChat { .. }, StageAnswer::GroupChat { .. }) => Ok(()),
        (StageSpec::VoteForLeader, StageAnswer::VoteForLeader { rankings }) => {
            if rankings.is_empty() {
                return Err(StudyError::validation("rankings", "rankings are empty"));
            }
            let mut seen = HashSet::new();
            for (index, ranked) in rankings.iter().enumerate() {
                if !seen.insert(ranked) {
                    return Err(StudyError::validation(
                        format!("rankings.{index}"),
                        "participant ranked more than once",
                    ));
                }
            }
            Ok(())
        }
        // Kind equality was checked above.
        _ => Err(StudyError::validation("kind", "answer shape mismatch")),
    }
}

fn validate_question_answer(
    config: &QuestionConfig,
    answer: &crate::stage::QuestionAnswer,
    path: &str,
) -> StudyResult<()> {
    use crate::stage::QuestionAnswer;

    match (config, answer) {
        (QuestionConfig::MultipleChoice { options, .. }, QuestionAnswer::MultipleChoice { choice, .. }) => {
            if *choice >= options.len() {
                return Err(StudyError::validation(
                    format!("{path}.choice"),
                    "choice index out of range",
                ));
            }
            Ok(())
        }
        (QuestionConfig::Rating { item1, item2, .. }, QuestionAnswer::Rating { choice, .. }) => {
            if choice != item1 && choice != item2 {
                return Err(StudyError::validation(
                    format!("{path}.choice"),
                    "choice is not one of the paired items",
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PublicId;
    use std::collections::BTreeMap;

    fn rating_survey() -> StageConfig {
        StageConfig::new(
            "Initial survival task",
            StageSpec::LostAtSeaSurvey {
                questions: vec![crate::stage::RatingQuestion {
                    id: 0,
                    question_text: "Choose the more helpful item".into(),
                    item1: "sextant".into(),
                    item2: "mirror".into(),
                }],
            },
        )
    }

    #[test]
    fn accepts_well_formed_rating_answer() {
        let stage = rating_survey();
        let answer = StageAnswer::LostAtSeaSurvey {
            answers: BTreeMap::from([(
                0,
                crate::stage::RatingAnswer {
                    id: 0,
                    choice: "mirror".into(),
                },
            )]),
        };
        assert!(validate_answer(&stage, &answer).is_ok());
    }

    #[test]
    fn rejects_unknown_question_id() {
        let stage = rating_survey();
        let answer = StageAnswer::LostAtSeaSurvey {
            answers: BTreeMap::from([(
                7,
                crate::stage::RatingAnswer {
                    id: 7,
                    choice: "mirror".into(),
                },
            )]),
        };
        let err = validate_answer(&stage, &answer).unwrap_err();
        assert!(matches!(err, StudyError::Validation { path, .. } if path == "answers.7"));
    }

    #[test]
    fn rejects_choice_outside_pair() {
        let stage = rating_survey();
        let answer = StageAnswer::LostAtSeaSurvey {
            answers: BTreeMap::from([(
                0,
                crate::stage::RatingAnswer {
                    id: 0,
                    choice: "rope".into(),
                },
            )]),
        };
        assert!(validate_answer(&stage, &answer).is_err());
    }

    #[test]
    fn rejects_kind_mismatch() {
        let stage = rating_survey();
        let answer = StageAnswer::GroupChat {
            ready_to_end_chat: true,
        };
        let err = validate_answer(&stage, &answer).unwrap_err();
        assert!(matches!(err, StudyError::Validation { path, .. } if path == "kind"));
    }

    #[test]
    fn rejects_duplicate_ranking_entries() {
        let stage = StageConfig::new("Election", StageSpec::VoteForLeader);
        let answer = StageAnswer::VoteForLeader {
            rankings: vec![PublicId::new("p1"), PublicId::new("p1")],
        };
        assert!(validate_answer(&stage, &answer).is_err());
    }

    #[test]
    fn rejects_answers_for_info_stage() {
        let stage = StageConfig::new("Welcome", StageSpec::Info { info_lines: vec![] });
        let answer = StageAnswer::GroupChat {
            ready_to_end_chat: false,
        };
        assert!(validate_answer(&stage, &answer).is_err());
    }
}
