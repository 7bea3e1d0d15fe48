//! Core deterministic primitives.
//!
//! Everything the round logic draws from randomness goes through here,
//! so a fixed seed reproduces a full sequence of rounds.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, derive_round_seed};
