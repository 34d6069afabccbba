//! Stage constructors with the stock defaults.

use convene_types::{
    ItemPair, PayoutBundle, PayoutCurrency, QuestionConfig, RatingQuestion, StageConfig, StageId,
    StageSpec,
};

pub fn info_stage(name: impl Into<String>, info_lines: Vec<String>) -> StageConfig {
    StageConfig::new(name, StageSpec::Info { info_lines })
}

pub fn tos_stage(tos_lines: Vec<String>) -> StageConfig {
    StageConfig::new(
        "Agree to the terms of service",
        StageSpec::TermsOfService { tos_lines },
    )
}

pub fn profile_stage() -> StageConfig {
    StageConfig::new("Set up your profile", StageSpec::SetProfile)
}

pub fn survey_stage(name: impl Into<String>, questions: Vec<QuestionConfig>) -> StageConfig {
    StageConfig::new(name, StageSpec::TakeSurvey { questions })
}

pub fn lost_at_sea_survey_stage(
    name: impl Into<String>,
    questions: Vec<RatingQuestion>,
) -> StageConfig {
    StageConfig::new(name, StageSpec::LostAtSeaSurvey { questions })
}

pub fn wtl_survey_stage() -> StageConfig {
    StageConfig::new(
        "Willingness to lead",
        StageSpec::WtlSurvey {
            question_text: "How much would you like to be the group leader?".to_string(),
            lower_bound: "Not at all".to_string(),
            upper_bound: "Very much".to_string(),
        },
    )
}

pub fn chat_stage(name: impl Into<String>, ratings_to_discuss: Vec<ItemPair>) -> StageConfig {
    StageConfig::new(name, StageSpec::GroupChat { ratings_to_discuss })
}

pub fn vote_for_leader_stage(name: impl Into<String>) -> StageConfig {
    StageConfig::new(name, StageSpec::VoteForLeader)
}

/// The scoring spec starts empty; [`assemble`](crate::assemble) bakes it.
pub fn payout_stage(
    name: impl Into<String>,
    currency: PayoutCurrency,
    payouts: Vec<PayoutBundle>,
) -> StageConfig {
    StageConfig::new(
        name,
        StageSpec::Payout {
            currency,
            payouts,
            scoring: Vec::new(),
        },
    )
}

pub fn reveal_stage(name: impl Into<String>, stages_to_reveal: Vec<StageId>) -> StageConfig {
    StageConfig::new(name, StageSpec::Reveal { stages_to_reveal })
}
