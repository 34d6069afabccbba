//! Private stage answers and the public per-stage aggregates

use crate::ids::PublicId;
use crate::stage::{QuestionAnswer, RatingAnswer, StageKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Codec for maps keyed by question id.
///
/// Question-keyed maps serialize with string keys (the JSON document
/// form) and parse them back to `u32` on the way in. The enums holding
/// them are internally tagged, which routes deserialization through
/// serde's buffered content, and that path does not convert string map
/// keys to integers on its own.
mod question_keys {
    use serde::de::{Deserializer, Error as DeError, MapAccess, Visitor};
    use serde::ser::{SerializeMap, Serializer};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::fmt;
    use std::marker::PhantomData;

    pub fn serialize<V, S>(map: &BTreeMap<u32, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        V: Serialize,
        S: Serializer,
    {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in map {
            out.serialize_entry(&key.to_string(), value)?;
        }
        out.end()
    }

    pub fn deserialize<'de, V, D>(deserializer: D) -> Result<BTreeMap<u32, V>, D::Error>
    where
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        struct QuestionMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for QuestionMapVisitor<V> {
            type Value = BTreeMap<u32, V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map keyed by question id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = BTreeMap::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    let id = key.parse::<u32>().map_err(|_| {
                        A::Error::custom(format!("invalid question id key `{key}`"))
                    })?;
                    map.insert(id, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(QuestionMapVisitor(PhantomData))
    }
}

/// [`question_keys`] lifted over a per-participant outer map.
mod participant_question_keys {
    use crate::ids::PublicId;
    use serde::de::{Deserializer, MapAccess, Visitor};
    use serde::ser::{SerializeMap, Serializer};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::fmt;
    use std::marker::PhantomData;

    struct AsQuestionMap<'a, V>(&'a BTreeMap<u32, V>);

    impl<V: Serialize> Serialize for AsQuestionMap<'_, V> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            super::question_keys::serialize(self.0, serializer)
        }
    }

    struct FromQuestionMap<V>(BTreeMap<u32, V>);

    impl<'de, V: Deserialize<'de>> Deserialize<'de> for FromQuestionMap<V> {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            super::question_keys::deserialize(deserializer).map(FromQuestionMap)
        }
    }

    pub fn serialize<V, S>(
        map: &BTreeMap<PublicId, BTreeMap<u32, V>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        V: Serialize,
        S: Serializer,
    {
        let mut out = serializer.serialize_map(Some(map.len()))?;
        for (participant, answers) in map {
            out.serialize_entry(participant, &AsQuestionMap(answers))?;
        }
        out.end()
    }

    pub fn deserialize<'de, V, D>(
        deserializer: D,
    ) -> Result<BTreeMap<PublicId, BTreeMap<u32, V>>, D::Error>
    where
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        struct ParticipantMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for ParticipantMapVisitor<V> {
            type Value = BTreeMap<PublicId, BTreeMap<u32, V>>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map keyed by public participant id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = BTreeMap::new();
                while let Some((key, value)) =
                    access.next_entry::<PublicId, FromQuestionMap<V>>()?
                {
                    map.insert(key, value.0);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(ParticipantMapVisitor(PhantomData))
    }
}

/// A participant's private answer for one stage.
///
/// Lazily created on first submission. Composite kinds (the survey family)
/// merge on resubmission: new question answers overlay, old ones persist.
/// Scalar kinds (chat readiness, WTL score) replace wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StageAnswer {
    #[serde(rename = "survey")]
    Survey {
        #[serde(with = "question_keys")]
        answers: BTreeMap<u32, QuestionAnswer>,
    },
    LostAtSeaSurvey {
        #[serde(with = "question_keys")]
        answers: BTreeMap<u32, RatingAnswer>,
    },
    WtlSurvey {
        score: u32,
    },
    VoteForLeader {
        /// Ordered list of preferred leaders, by public id, best first.
        rankings: Vec<PublicId>,
    },
    GroupChat {
        ready_to_end_chat: bool,
    },
}

impl StageAnswer {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Survey { .. } => StageKind::TakeSurvey,
            Self::LostAtSeaSurvey { .. } => StageKind::LostAtSeaSurvey,
            Self::WtlSurvey { .. } => StageKind::WtlSurvey,
            Self::VoteForLeader { .. } => StageKind::VoteForLeader,
            Self::GroupChat { .. } => StageKind::GroupChat,
        }
    }
}

/// Group-visible aggregate state for one stage, derived incrementally from
/// every private answer seen so far.
///
/// Invariant: every entry keyed by a public id corresponds to a participant
/// holding at least one private [`StageAnswer`] for the stage. Entries are
/// appended or overwritten, never rebuilt from scratch on read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PublicStageData {
    #[serde(rename = "survey")]
    Survey {
        #[serde(with = "participant_question_keys")]
        participant_answers: BTreeMap<PublicId, BTreeMap<u32, QuestionAnswer>>,
    },
    LostAtSeaSurvey {
        #[serde(with = "participant_question_keys")]
        participant_answers: BTreeMap<PublicId, BTreeMap<u32, RatingAnswer>>,
    },
    WtlSurvey {
        participant_scores: BTreeMap<PublicId, u32>,
    },
    GroupChat {
        /// Count of currently-active participants, refreshed on each update.
        number_of_participants: usize,
        ready_to_end_chat: BTreeMap<PublicId, bool>,
    },
    VoteForLeader {
        participant_rankings: BTreeMap<PublicId, Vec<PublicId>>,
        /// Plurality first-choice winner among rankings submitted so far.
        /// Provisional until every active participant has voted.
        current_leader: Option<PublicId>,
    },
}

impl PublicStageData {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Survey { .. } => StageKind::TakeSurvey,
            Self::LostAtSeaSurvey { .. } => StageKind::LostAtSeaSurvey,
            Self::WtlSurvey { .. } => StageKind::WtlSurvey,
            Self::GroupChat { .. } => StageKind::GroupChat,
            Self::VoteForLeader { .. } => StageKind::VoteForLeader,
        }
    }

    /// Empty aggregate for a stage kind, or `None` for kinds without
    /// public data.
    pub fn empty(kind: StageKind) -> Option<Self> {
        match kind {
            StageKind::TakeSurvey => Some(Self::Survey {
                participant_answers: BTreeMap::new(),
            }),
            StageKind::LostAtSeaSurvey => Some(Self::LostAtSeaSurvey {
                participant_answers: BTreeMap::new(),
            }),
            StageKind::WtlSurvey => Some(Self::WtlSurvey {
                participant_scores: BTreeMap::new(),
            }),
            StageKind::GroupChat => Some(Self::GroupChat {
                number_of_participants: 0,
                ready_to_end_chat: BTreeMap::new(),
            }),
            StageKind::VoteForLeader => Some(Self::VoteForLeader {
                participant_rankings: BTreeMap::new(),
                current_leader: None,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_round_trips_with_integer_question_keys() {
        let answer = StageAnswer::Survey {
            answers: BTreeMap::from([(
                0,
                QuestionAnswer::Rating {
                    id: 0,
                    choice: "mirror".into(),
                },
            )]),
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["kind"], "survey");
        assert_eq!(json["answers"]["0"]["choice"], "mirror");

        let back: StageAnswer = serde_json::from_value(json).unwrap();
        assert_eq!(back, answer);
    }

    #[test]
    fn public_data_round_trips_with_nested_question_keys() {
        let p0 = PublicId::new("p-0000");
        let data = PublicStageData::LostAtSeaSurvey {
            participant_answers: BTreeMap::from([(
                p0.clone(),
                BTreeMap::from([
                    (
                        0,
                        RatingAnswer {
                            id: 0,
                            choice: "mirror".into(),
                        },
                    ),
                    (
                        3,
                        RatingAnswer {
                            id: 3,
                            choice: "rope".into(),
                        },
                    ),
                ]),
            )]),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "lostAtSeaSurvey");
        assert_eq!(json["participantAnswers"]["p-0000"]["3"]["choice"], "rope");

        let back: PublicStageData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn empty_aggregate_matches_kind() {
        for kind in [
            StageKind::TakeSurvey,
            StageKind::LostAtSeaSurvey,
            StageKind::WtlSurvey,
            StageKind::GroupChat,
            StageKind::VoteForLeader,
        ] {
            let data = PublicStageData::empty(kind).unwrap();
            assert_eq!(data.kind(), kind);
        }
        assert!(PublicStageData::empty(StageKind::Info).is_none());
        assert!(PublicStageData::empty(StageKind::Reveal).is_none());
    }
}
