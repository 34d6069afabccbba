//! Persistence layer for Convene
//!
//! Models the backing database as an abstract transactional document
//! store ([`DocumentStore`]): read, merge-or-replace write, atomic
//! read-modify-write with automatic conflict retry, batched all-or-nothing
//! writes, and recursive delete. [`MemoryStore`] is the in-memory backend
//! used for development and tests.
//!
//! [`StudyService`] wires the pure engines to the store: it validates and
//! merges answer submissions, keeps each stage's public aggregate current,
//! moves the progression cursor, and computes payouts with a
//! persisted-once random selection.

#![deny(unsafe_code)]

mod auth;
mod path;
mod service;
mod store;

pub use auth::*;
pub use path::*;
pub use service::*;
pub use store::*;
