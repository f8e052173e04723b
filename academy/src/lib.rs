//! Cipher Academy: a small cryptography training campaign.
//!
//! The crate keeps a strict split between deterministic game logic and the
//! side effects around it:
//!
//! - **[`core`]**: Pure state machines (campaign, event bus, mini-games,
//!   advisor). No I/O and no clock; time arrives as an argument.
//! - **[`io`]**: Config, progress storage, prompt rendering and the external
//!   text generator.
//!
//! [`session`] wires the two together and owns the virtual clock. [`play`]
//! binds a session to a terminal.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod play;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
