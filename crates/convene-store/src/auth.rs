//! Capability checks: experimenter vs participant

use convene_types::{ParticipantId, StudyError, StudyResult};

/// Who is making a request.
///
/// Participants hold their private id as a capability token; the
/// experimenter surface (experiment creation/deletion, boot-out) requires
/// [`Caller::Experimenter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caller {
    Experimenter,
    Participant(ParticipantId),
}

impl Caller {
    pub fn require_experimenter(&self) -> StudyResult<()> {
        match self {
            Self::Experimenter => Ok(()),
            Self::Participant(_) => Err(StudyError::NotExperimenter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participants_are_not_experimenters() {
        let caller = Caller::Participant(ParticipantId::new("priv"));
        assert!(matches!(
            caller.require_experimenter(),
            Err(StudyError::NotExperimenter)
        ));
        assert!(Caller::Experimenter.require_experimenter().is_ok());
    }
}
