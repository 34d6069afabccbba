//! Core engines for Convene
//!
//! Three pure engines over the domain types:
//!
//! - **aggregation**: derives per-stage public data incrementally from
//!   private answer submissions. A pure function of the submissions seen so
//!   far, so replaying history reproduces the live aggregate exactly.
//! - **progression**: the per-participant stage cursor: group-readiness
//!   gates, advancement, terminal completion states.
//! - **payout**: deterministic scoring of recorded answers against a baked
//!   scoring spec, with persisted choose-one draws.
//!
//! Nothing here touches storage or transport; the store layer feeds these
//! engines and persists their outputs.

#![deny(unsafe_code)]

mod aggregation;
mod payout;
mod progression;

pub use aggregation::*;
pub use payout::*;
pub use progression::*;
