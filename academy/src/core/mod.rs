//! Deterministic, pure logic shared by the academy.
//!
//! Core modules must be free of I/O side effects and never read a clock.
//! They operate on in-memory data structures and return deterministic outputs
//! suitable for tests; randomness comes in as an injected, seedable RNG.

pub mod advisor;
pub mod bus;
pub mod campaign;
pub mod handshake;
pub mod invariants;
pub mod knowledge;
pub mod rail_fence;
pub mod registry;
pub mod timers;
pub mod types;
pub mod wave;
