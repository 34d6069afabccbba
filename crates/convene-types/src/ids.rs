//! Identifier newtypes
//!
//! Public ids are shown to other participants; private participant ids are
//! capability tokens and must never appear in public stage data.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of an experiment document.
    ExperimentId
);

string_id!(
    /// Identifier of a stage within an experiment.
    StageId
);

string_id!(
    /// Private participant identifier. Acts as a capability token.
    ParticipantId
);

string_id!(
    /// Public participant identifier, visible to peers.
    ///
    /// Sequentially assigned and zero-padded so lexicographic order matches
    /// assignment order (election tie-breaks rely on this).
    PublicId
);

impl PublicId {
    /// Public id for the `index`-th participant of an experiment. Padded
    /// to the full `u32` width so lexicographic order matches assignment
    /// order for every representable index.
    pub fn from_index(index: u32) -> Self {
        Self(format!("p-{index:010}"))
    }
}
