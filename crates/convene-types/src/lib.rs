//! Domain types for Convene
//!
//! A Convene experiment is an ordered list of heterogeneous **stages**
//! (surveys, group chats, leader elections, payouts). Participants progress
//! through the stages in order; their private **stage answers** feed
//! group-visible **public stage data**, and a payout stage scores the
//! recorded answers against a spec baked at assembly time.
//!
//! # Key Concepts
//!
//! - **StageConfig**: Immutable per-stage configuration, kind-tagged.
//! - **StageAnswer**: A participant's private answer for one stage,
//!   lazily created on first submission and merged on resubmission.
//! - **PublicStageData**: The per-stage aggregate derived from every
//!   private answer seen so far (survey answer maps, chat readiness,
//!   election rankings and the provisional leader).
//! - **ScoringBundle / ScoringItem / ScoringQuestion**: The payout spec
//!   with ground-truth answers baked in, so payout computation never
//!   needs access to scoring rules.
//!
//! # Design Principles
//!
//! 1. Every persisted union carries a `kind` discriminant and is an
//!    exhaustively matched Rust enum, not a runtime-narrowed record.
//! 2. Aggregates use ordered maps so derived values (leader tie-breaks,
//!    replay) are deterministic.
//! 3. Validation is pure and structural; storage and transport live
//!    elsewhere.

#![deny(unsafe_code)]

mod answer;
mod errors;
mod experiment;
mod ids;
mod participant;
mod payout;
mod registry;
mod stage;

pub use answer::*;
pub use errors::*;
pub use experiment::*;
pub use ids::*;
pub use participant::*;
pub use payout::*;
pub use registry::*;
pub use stage::*;
