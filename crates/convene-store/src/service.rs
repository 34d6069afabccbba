//! The study service: participant-facing operations over the store
//!
//! Wires the pure engines to persistence. Per-participant mutations are
//! independent; the shared per-stage public data document is the single
//! point of contention and is only touched through the store's atomic
//! `update`, so concurrent submissions never clobber each other's partial
//! updates.

use crate::auth::Caller;
use crate::path::DocPath;
use crate::store::{merge_value, DocumentStore};
use chrono::Utc;
use convene_engine::{
    apply_answer, compute_payout, draw_selection, ready_for_stage, transfer_entry_stage,
    AdvanceOutcome, AnswerSource, ProgressionEngine, StageReadiness,
};
use convene_types::{
    CompletionReason, Experiment, ExperimentId, ExperimentPlan, ParticipantId, ParticipantProfile,
    PayoutAmount, PayoutSelection, ProfileUpdate, PublicId, PublicStageData, QuestionAnswer,
    ScoringBundle, StageAnswer, StageConfig, StageId, StageSpec, StudyError, StudyResult,
    TransferConfig, validate_answer,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use tracing::info;

fn to_doc<T: Serialize>(value: &T) -> StudyResult<Value> {
    serde_json::to_value(value).map_err(|err| StudyError::Store(err.to_string()))
}

fn from_doc<T: DeserializeOwned>(value: Value) -> StudyResult<T> {
    serde_json::from_value(value).map_err(|err| StudyError::Store(err.to_string()))
}

/// Result of creating an experiment: the new id plus the private ids of
/// the pre-created participants, in public-id order.
#[derive(Clone, Debug)]
pub struct CreatedExperiment {
    pub experiment_id: ExperimentId,
    pub participant_ids: Vec<ParticipantId>,
}

/// Participant-facing operations over a [`DocumentStore`].
pub struct StudyService<S> {
    store: S,
    progression: ProgressionEngine,
    rng_seed: Option<u64>,
}

impl<S: DocumentStore> StudyService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            progression: ProgressionEngine::new(),
            rng_seed: None,
        }
    }

    /// Fix the seed for payout draws, for reproducible fixtures. Draws
    /// stay independent per participant.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Experimenter surface ─────────────────────────────────────────

    /// Persist an assembled experiment: metadata, stage docs (scoring
    /// already baked) and the pre-created participants, all or nothing.
    pub async fn create_experiment(
        &self,
        caller: &Caller,
        plan: &ExperimentPlan,
    ) -> StudyResult<CreatedExperiment> {
        caller.require_experimenter()?;
        let first_stage = plan
            .stages
            .first()
            .map(|stage| stage.id.clone())
            .ok_or_else(|| StudyError::Structural("experiment has no stages".into()))?;

        let experiment_id = ExperimentId::generate();
        let experiment = Experiment {
            name: plan.name.clone(),
            stage_ids: plan.stage_ids(),
            number_of_participants: plan.number_of_participants,
            created_at: Utc::now(),
        };

        let mut writes = vec![(DocPath::experiment(&experiment_id), to_doc(&experiment)?)];
        for stage in &plan.stages {
            writes.push((DocPath::stage(&experiment_id, &stage.id), to_doc(stage)?));
        }

        let mut participant_ids = Vec::new();
        for index in 0..plan.number_of_participants {
            let participant_id = ParticipantId::generate();
            let profile = ParticipantProfile::new(PublicId::from_index(index), first_stage.clone());
            writes.push((
                DocPath::participant(&experiment_id, &participant_id),
                to_doc(&profile)?,
            ));
            participant_ids.push(participant_id);
        }

        self.store.write_batch(writes).await?;
        info!(
            experiment = %experiment_id,
            stages = plan.stages.len(),
            participants = participant_ids.len(),
            "created experiment"
        );

        Ok(CreatedExperiment {
            experiment_id,
            participant_ids,
        })
    }

    /// Recursively delete an experiment and everything beneath it.
    pub async fn delete_experiment(
        &self,
        caller: &Caller,
        experiment_id: &ExperimentId,
    ) -> StudyResult<()> {
        caller.require_experimenter()?;
        self.load_experiment(experiment_id).await?;
        self.store
            .delete_tree(&DocPath::experiment(experiment_id))
            .await?;
        info!(experiment = %experiment_id, "deleted experiment");
        Ok(())
    }

    /// Remove a participant from the running experiment.
    pub async fn boot_out(
        &self,
        caller: &Caller,
        experiment_id: &ExperimentId,
        participant_id: &ParticipantId,
    ) -> StudyResult<()> {
        caller.require_experimenter()?;
        self.mark_completed(experiment_id, participant_id, CompletionReason::BootedOut)
            .await
    }

    // ── Participant lifecycle ────────────────────────────────────────

    /// Add one participant to an experiment.
    ///
    /// With `transfer` set, the participant arrives from a lobby
    /// experiment: they keep their private id, enter at the stage after
    /// the source lobby stage, and their private answers are copied over.
    pub async fn join_experiment(
        &self,
        experiment_id: &ExperimentId,
        transfer: Option<TransferConfig>,
    ) -> StudyResult<(ParticipantId, ParticipantProfile)> {
        let experiment = self.load_experiment(experiment_id).await?;

        let (participant_id, entry_stage, copied_answers) = match &transfer {
            Some(transfer) => {
                let source_experiment = self.load_experiment(&transfer.experiment_id).await?;
                let source_profile = self
                    .load_participant(&transfer.experiment_id, &transfer.participant_id)
                    .await?;

                let entry = transfer_entry_stage(
                    &source_experiment.stage_ids,
                    &source_profile.current_stage_id,
                )?;
                if experiment.stage_index(&entry).is_none() {
                    return Err(StudyError::Structural(format!(
                        "transfer entry stage {entry} is not part of the target experiment"
                    )));
                }

                let answers = self
                    .store
                    .list(&DocPath::stage_answers(
                        &transfer.experiment_id,
                        &transfer.participant_id,
                    ))
                    .await?;
                (transfer.participant_id.clone(), entry, answers)
            }
            None => {
                let first = experiment
                    .stage_ids
                    .first()
                    .cloned()
                    .ok_or_else(|| StudyError::Structural("experiment has no stages".into()))?;
                (ParticipantId::generate(), first, Vec::new())
            }
        };

        // Claim the next public index and bump the participant count in
        // one atomic step.
        let mut assigned_index = 0u32;
        let experiment_path = DocPath::experiment(experiment_id);
        self.store
            .update(&experiment_path, &mut |prev| {
                let mut doc: Experiment = from_doc(prev.ok_or_else(|| {
                    StudyError::not_found(format!("experiment {experiment_id}"))
                })?)?;
                assigned_index = doc.number_of_participants;
                doc.number_of_participants += 1;
                to_doc(&doc)
            })
            .await?;

        let mut profile = ParticipantProfile::new(PublicId::from_index(assigned_index), entry_stage);
        profile.transfer = transfer;

        let mut writes = vec![(
            DocPath::participant(experiment_id, &participant_id),
            to_doc(&profile)?,
        )];
        let mut copied: Vec<(StageId, Value)> = Vec::new();
        for (source_path, answer) in copied_answers {
            let stage_id = StageId::new(source_path.leaf());
            writes.push((
                DocPath::stage_answer(experiment_id, &participant_id, &stage_id),
                answer.clone(),
            ));
            copied.push((stage_id, answer));
        }
        self.store.write_batch(writes).await?;

        // Copied answers join the target's public aggregates too, so the
        // public picture stays derivable from the private answers.
        for (stage_id, doc) in copied {
            let Some(stage_doc) = self
                .store
                .read(&DocPath::stage(experiment_id, &stage_id))
                .await?
            else {
                continue;
            };
            let stage: StageConfig = from_doc(stage_doc)?;
            if !stage.kind().has_public_data() {
                continue;
            }
            let answer: StageAnswer = from_doc(doc)?;
            self.fold_into_public_data(experiment_id, &stage, &profile.public_id, &answer)
                .await?;
        }

        info!(
            experiment = %experiment_id,
            participant = %profile.public_id,
            transferred = profile.transfer.is_some(),
            "participant joined"
        );
        Ok((participant_id, profile))
    }

    /// Update the participant's own profile fields.
    pub async fn update_profile(
        &self,
        experiment_id: &ExperimentId,
        participant_id: &ParticipantId,
        update: ProfileUpdate,
    ) -> StudyResult<ParticipantProfile> {
        let path = DocPath::participant(experiment_id, participant_id);
        let mut updated = None;
        self.store
            .update(&path, &mut |prev| {
                let mut profile: ParticipantProfile = from_doc(prev.ok_or_else(|| {
                    StudyError::not_found(format!("participant {participant_id}"))
                })?)?;
                profile.apply_update(update.clone());
                updated = Some(profile.clone());
                to_doc(&profile)
            })
            .await?;
        updated.ok_or_else(|| StudyError::Store("profile update produced no profile".into()))
    }

    // ── Answers ──────────────────────────────────────────────────────

    /// Submit (and merge) a private answer, then fold it into the
    /// stage's public aggregate.
    pub async fn submit_answer(
        &self,
        experiment_id: &ExperimentId,
        participant_id: &ParticipantId,
        stage_id: &StageId,
        answer: StageAnswer,
    ) -> StudyResult<()> {
        let stage = self.load_stage(experiment_id, stage_id).await?;
        let profile = self.load_participant(experiment_id, participant_id).await?;
        if profile.is_completed() {
            return Err(StudyError::ParticipantCompleted);
        }
        validate_answer(&stage, &answer)?;

        // Re-voting requires an explicit separate mutation, not submit.
        let is_vote = matches!(answer, StageAnswer::VoteForLeader { .. });
        let incoming = to_doc(&answer)?;
        let answer_path = DocPath::stage_answer(experiment_id, participant_id, stage_id);
        self.store
            .update(&answer_path, &mut |prev| {
                if is_vote && prev.is_some() {
                    return Err(StudyError::DuplicateVote);
                }
                match prev {
                    Some(mut existing) => {
                        merge_value(&mut existing, incoming.clone());
                        Ok(existing)
                    }
                    None => Ok(incoming.clone()),
                }
            })
            .await?;

        self.fold_into_public_data(experiment_id, &stage, &profile.public_id, &answer)
            .await?;

        info!(
            experiment = %experiment_id,
            participant = %profile.public_id,
            stage = %stage_id,
            "accepted answer"
        );
        Ok(())
    }

    pub async fn get_answer(
        &self,
        experiment_id: &ExperimentId,
        participant_id: &ParticipantId,
        stage_id: &StageId,
    ) -> StudyResult<Option<StageAnswer>> {
        self.load_participant(experiment_id, participant_id).await?;
        self.load_stage(experiment_id, stage_id).await?;
        let path = DocPath::stage_answer(experiment_id, participant_id, stage_id);
        self.store.read(&path).await?.map(from_doc).transpose()
    }

    // ── Progression ──────────────────────────────────────────────────

    /// Try to advance the participant past their current stage.
    pub async fn advance_stage(
        &self,
        experiment_id: &ExperimentId,
        participant_id: &ParticipantId,
    ) -> StudyResult<AdvanceOutcome> {
        let experiment = self.load_experiment(experiment_id).await?;
        let profile = self.load_participant(experiment_id, participant_id).await?;
        if profile.is_completed() {
            return Err(StudyError::ParticipantCompleted);
        }
        let stage = self
            .load_stage(experiment_id, &profile.current_stage_id)
            .await?;

        let readiness = if stage.kind().gates_on_group() {
            self.stage_readiness(experiment_id, &stage).await?
        } else {
            StageReadiness::default()
        };

        let engine = self.progression;
        let now = Utc::now();
        let mut outcome = None;
        let path = DocPath::participant(experiment_id, participant_id);
        self.store
            .update(&path, &mut |prev| {
                let mut profile: ParticipantProfile = from_doc(prev.ok_or_else(|| {
                    StudyError::not_found(format!("participant {participant_id}"))
                })?)?;
                let result = engine.advance(&mut profile, &experiment, &stage, &readiness, now)?;
                outcome = Some(result);
                to_doc(&profile)
            })
            .await?;

        outcome.ok_or_else(|| StudyError::Store("advance produced no outcome".into()))
    }

    /// Ready/not-ready split of active participants for one stage.
    pub async fn participants_ready_for_stage(
        &self,
        experiment_id: &ExperimentId,
        stage_id: &StageId,
    ) -> StudyResult<StageReadiness> {
        let stage = self.load_stage(experiment_id, stage_id).await?;
        self.stage_readiness(experiment_id, &stage).await
    }

    /// Forced terminal transition: attention timeout, lobby outcomes,
    /// boot-out, or explicit success marking.
    pub async fn mark_completed(
        &self,
        experiment_id: &ExperimentId,
        participant_id: &ParticipantId,
        reason: CompletionReason,
    ) -> StudyResult<()> {
        let engine = self.progression;
        let now = Utc::now();
        let path = DocPath::participant(experiment_id, participant_id);
        self.store
            .update(&path, &mut |prev| {
                let mut profile: ParticipantProfile = from_doc(prev.ok_or_else(|| {
                    StudyError::not_found(format!("participant {participant_id}"))
                })?)?;
                engine.force_complete(&mut profile, reason, now);
                to_doc(&profile)
            })
            .await?;
        info!(
            experiment = %experiment_id,
            participant = %participant_id,
            ?reason,
            "participant completed"
        );
        Ok(())
    }

    // ── Payout ───────────────────────────────────────────────────────

    /// Compute the participant's payout for a payout stage.
    ///
    /// The choose-one bundle draw is committed exactly once per
    /// participant (atomic create-if-absent); repeat calls reuse the
    /// persisted selection and always yield the same amount.
    pub async fn compute_payout(
        &self,
        experiment_id: &ExperimentId,
        participant_id: &ParticipantId,
        stage_id: &StageId,
    ) -> StudyResult<PayoutAmount> {
        let stage = self.load_stage(experiment_id, stage_id).await?;
        let StageSpec::Payout {
            currency,
            payouts,
            scoring,
        } = &stage.spec
        else {
            return Err(StudyError::validation("kind", "stage is not a payout stage"));
        };
        if scoring.is_empty() && !payouts.is_empty() {
            return Err(StudyError::Structural(
                "payout stage has no baked scoring spec".into(),
            ));
        }
        let profile = self.load_participant(experiment_id, participant_id).await?;

        // Resolve every graded dependency before committing the draw, so
        // an incomplete election leaves no persisted selection behind.
        let answers = self
            .collect_payout_answers(experiment_id, participant_id, scoring)
            .await?;

        let selection_path = DocPath::payout_selection(experiment_id, participant_id, stage_id);
        let mut rng = self.rng_for(&profile.public_id);
        let selection_doc = self
            .store
            .update(&selection_path, &mut |prev| match prev {
                Some(existing) => Ok(existing),
                None => to_doc(&draw_selection(scoring, &mut rng)),
            })
            .await?;
        let selection: PayoutSelection = from_doc(selection_doc)?;

        compute_payout(*currency, scoring, &selection, &answers)
    }

    // ── Internal helpers ─────────────────────────────────────────────

    async fn load_experiment(&self, experiment_id: &ExperimentId) -> StudyResult<Experiment> {
        let doc = self
            .store
            .read(&DocPath::experiment(experiment_id))
            .await?
            .ok_or_else(|| StudyError::not_found(format!("experiment {experiment_id}")))?;
        from_doc(doc)
    }

    async fn load_stage(
        &self,
        experiment_id: &ExperimentId,
        stage_id: &StageId,
    ) -> StudyResult<StageConfig> {
        let doc = self
            .store
            .read(&DocPath::stage(experiment_id, stage_id))
            .await?
            .ok_or_else(|| StudyError::not_found(format!("stage {stage_id}")))?;
        from_doc(doc)
    }

    async fn load_participant(
        &self,
        experiment_id: &ExperimentId,
        participant_id: &ParticipantId,
    ) -> StudyResult<ParticipantProfile> {
        let doc = self
            .store
            .read(&DocPath::participant(experiment_id, participant_id))
            .await?
            .ok_or_else(|| StudyError::not_found(format!("participant {participant_id}")))?;
        from_doc(doc)
    }

    async fn load_public_data(
        &self,
        experiment_id: &ExperimentId,
        stage_id: &StageId,
    ) -> StudyResult<Option<PublicStageData>> {
        self.store
            .read(&DocPath::public_stage_data(experiment_id, stage_id))
            .await?
            .map(from_doc)
            .transpose()
    }

    async fn list_participants(
        &self,
        experiment_id: &ExperimentId,
    ) -> StudyResult<Vec<ParticipantProfile>> {
        let docs = self
            .store
            .list(&DocPath::participants(experiment_id))
            .await?;
        docs.into_iter().map(|(_, doc)| from_doc(doc)).collect()
    }

    async fn count_active_participants(
        &self,
        experiment_id: &ExperimentId,
    ) -> StudyResult<usize> {
        Ok(self
            .list_participants(experiment_id)
            .await?
            .iter()
            .filter(|profile| profile.is_active())
            .count())
    }

    /// Fold one accepted answer into its stage's public aggregate, if the
    /// stage kind has one.
    async fn fold_into_public_data(
        &self,
        experiment_id: &ExperimentId,
        stage: &StageConfig,
        public_id: &PublicId,
        answer: &StageAnswer,
    ) -> StudyResult<()> {
        if !stage.kind().has_public_data() {
            return Ok(());
        }
        let active = self.count_active_participants(experiment_id).await?;
        let public_path = DocPath::public_stage_data(experiment_id, &stage.id);
        self.store
            .update(&public_path, &mut |prev| {
                let aggregate = prev.map(from_doc::<PublicStageData>).transpose()?;
                let next = apply_answer(stage, aggregate, public_id, answer, active)?;
                to_doc(&next)
            })
            .await?;
        Ok(())
    }

    async fn stage_readiness(
        &self,
        experiment_id: &ExperimentId,
        stage: &StageConfig,
    ) -> StudyResult<StageReadiness> {
        let participants = self.list_participants(experiment_id).await?;
        let public_data = self.load_public_data(experiment_id, &stage.id).await?;
        Ok(ready_for_stage(stage, &participants, public_data.as_ref()))
    }

    fn rng_for(&self, public_id: &PublicId) -> StdRng {
        match self.rng_seed {
            Some(seed) => {
                let mut hasher = DefaultHasher::new();
                public_id.hash(&mut hasher);
                StdRng::seed_from_u64(seed ^ hasher.finish())
            }
            None => StdRng::from_entropy(),
        }
    }

    /// Pre-load everything a payout computation may grade: the
    /// participant's own choices, each referenced election's leader, and
    /// the public choice maps used to grade the leader's answers.
    async fn collect_payout_answers(
        &self,
        experiment_id: &ExperimentId,
        participant_id: &ParticipantId,
        scoring: &[ScoringBundle],
    ) -> StudyResult<LoadedAnswers> {
        let mut answers = LoadedAnswers::default();

        for bundle in scoring {
            for item in &bundle.scoring_items {
                if !answers.own.contains_key(&item.survey_stage_id) {
                    let own = self
                        .store
                        .read(&DocPath::stage_answer(
                            experiment_id,
                            participant_id,
                            &item.survey_stage_id,
                        ))
                        .await?
                        .map(from_doc::<StageAnswer>)
                        .transpose()?
                        .map(|answer| choices_of(&answer))
                        .unwrap_or_default();
                    answers.own.insert(item.survey_stage_id.clone(), own);

                    let public = self
                        .load_public_data(experiment_id, &item.survey_stage_id)
                        .await?
                        .map(|data| public_choices_of(&data))
                        .unwrap_or_default();
                    answers.public.insert(item.survey_stage_id.clone(), public);
                }

                if let Some(election_stage) = &item.leader_stage_id {
                    if !answers.leaders.contains_key(election_stage) {
                        // The aggregate's leader is provisional while votes
                        // are still outstanding; only a fully voted
                        // election determines one.
                        let election = self.load_stage(experiment_id, election_stage).await?;
                        let readiness = self.stage_readiness(experiment_id, &election).await?;
                        if !readiness.everyone_ready() {
                            return Err(StudyError::IncompleteDependency(format!(
                                "election {election_stage} is still waiting on votes"
                            )));
                        }
                        if let Some(PublicStageData::VoteForLeader {
                            current_leader: Some(leader),
                            ..
                        }) = self.load_public_data(experiment_id, election_stage).await?
                        {
                            answers.leaders.insert(election_stage.clone(), leader);
                        }
                    }
                }
            }
        }

        Ok(answers)
    }
}

/// Recorded rating choices per question id.
fn choices_of(answer: &StageAnswer) -> BTreeMap<u32, String> {
    match answer {
        StageAnswer::LostAtSeaSurvey { answers } => answers
            .iter()
            .map(|(id, rating)| (*id, rating.choice.clone()))
            .collect(),
        StageAnswer::Survey { answers } => answers
            .iter()
            .filter_map(|(id, answer)| match answer {
                QuestionAnswer::Rating { choice, .. } => Some((*id, choice.clone())),
                _ => None,
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn public_choices_of(data: &PublicStageData) -> BTreeMap<PublicId, BTreeMap<u32, String>> {
    match data {
        PublicStageData::LostAtSeaSurvey {
            participant_answers,
        } => participant_answers
            .iter()
            .map(|(public_id, answers)| {
                (
                    public_id.clone(),
                    answers
                        .iter()
                        .map(|(id, rating)| (*id, rating.choice.clone()))
                        .collect(),
                )
            })
            .collect(),
        PublicStageData::Survey {
            participant_answers,
        } => participant_answers
            .iter()
            .map(|(public_id, answers)| {
                (
                    public_id.clone(),
                    answers
                        .iter()
                        .filter_map(|(id, answer)| match answer {
                            QuestionAnswer::Rating { choice, .. } => Some((*id, choice.clone())),
                            _ => None,
                        })
                        .collect(),
                )
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// [`AnswerSource`] over answers pre-loaded from the store.
#[derive(Default)]
struct LoadedAnswers {
    own: BTreeMap<StageId, BTreeMap<u32, String>>,
    leaders: BTreeMap<StageId, PublicId>,
    public: BTreeMap<StageId, BTreeMap<PublicId, BTreeMap<u32, String>>>,
}

impl AnswerSource for LoadedAnswers {
    fn own_choice(&self, survey_stage: &StageId, question_id: u32) -> Option<String> {
        self.own.get(survey_stage)?.get(&question_id).cloned()
    }

    fn leader_of(&self, election_stage: &StageId) -> Option<PublicId> {
        self.leaders.get(election_stage).cloned()
    }

    fn participant_choice(
        &self,
        participant: &PublicId,
        survey_stage: &StageId,
        question_id: u32,
    ) -> Option<String> {
        self.public
            .get(survey_stage)?
            .get(participant)?
            .get(&question_id)
            .cloned()
    }
}
