//! Static mission registry. Position in the list is the mission ordinal.

use crate::core::types::MissionId;

/// Immutable mission definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionDef {
    pub id: MissionId,
    pub title: &'static str,
    pub description: &'static str,
}

const MISSIONS: [MissionDef; 3] = [
    MissionDef {
        id: MissionId::DiffieHellman,
        title: "Mission 1: The Handshake",
        description: "Open a secure line to HQ by mixing colours in a Diffie-Hellman exchange.",
    },
    MissionDef {
        id: MissionId::Mitm,
        title: "Mission 2: The Interception",
        description: "Someone is sitting on the line. Intercept the forged packets before they reach HQ.",
    },
    MissionDef {
        id: MissionId::RailFence,
        title: "Mission 3: The Payload",
        description: "Rebuild the intercepted blueprint keyword with a two-rail Rail Fence cipher.",
    },
];

/// The campaign's fixed mission order.
pub fn mission_registry() -> &'static [MissionDef] {
    &MISSIONS
}
