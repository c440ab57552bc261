//! Corpus-facing domain model.
//!
//! # Responsibility
//! - Define the note record consumed from the corpus collaborator.
//! - Own note identity and tag validity rules.
//!
//! # Invariants
//! - A note identifier is a pure function of its title.
//! - Every persisted tag passed [`note::validate_tag`].

pub mod note;
