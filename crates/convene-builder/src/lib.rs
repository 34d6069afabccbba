//! Convene Builder - experiment assembly and game modules
//!
//! Authoring-side counterpart to the runtime crates: stage constructors
//! with sensible defaults, structural validation of a stage sequence, and
//! the scoring bake that turns payout bundle configuration plus the
//! referenced surveys into the self-contained scoring spec the payout
//! engine grades against.
//!
//! # Key Concepts
//!
//! - **Assembly**: [`assemble`] validates a stage sequence fail-fast and
//!   bakes scoring, producing an [`ExperimentPlan`](convene_types::ExperimentPlan)
//!   ready to persist. Stage references (payout to survey, payout to
//!   election, reveal to anything) must point at *earlier* stages, so a
//!   participant walking the sequence in order always finds every
//!   dependency already resolvable.
//! - **Scoring bake**: ground-truth answers come from the survival item
//!   table at assembly time; the runtime never consults the table.
//! - **Game modules**: [`lost_at_sea_game`] builds the full staged
//!   Lost-at-Sea leader-election game.

#![deny(unsafe_code)]

mod assembly;
mod items;
mod lost_at_sea;
mod stages;

pub use assembly::*;
pub use items::*;
pub use lost_at_sea::*;
pub use stages::*;
