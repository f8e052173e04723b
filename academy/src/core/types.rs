//! Shared deterministic types for the academy core.
//!
//! These types define stable contracts between the campaign, the event bus,
//! the mini-game engines and the advisor. They must not depend on external
//! state or I/O.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Virtual clock time in milliseconds since the session started.
pub type Millis = u64;

/// Stable mission key. The registry orders these; the enum itself does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissionId {
    DiffieHellman,
    Mitm,
    RailFence,
}

impl MissionId {
    pub const ALL: [MissionId; 3] = [MissionId::DiffieHellman, MissionId::Mitm, MissionId::RailFence];

    pub fn as_str(self) -> &'static str {
        match self {
            MissionId::DiffieHellman => "diffie-hellman",
            MissionId::Mitm => "mitm",
            MissionId::RailFence => "rail-fence",
        }
    }
}

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MissionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        MissionId::ALL
            .into_iter()
            .find(|id| id.as_str() == key)
            .ok_or_else(|| format!("unknown mission '{}'", s.trim()))
    }
}

/// Campaign-level status of a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    Pending,
    Active,
    Completed,
    /// The latest attempt failed; retrying puts the mission back to `Active`.
    Failed,
}

/// Kinds of recoverable player mistakes reported to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MistakeKind {
    RailPlacement,
    WrongLetter,
    PrivateLeak,
    Breach,
    CriticalBreach,
}

impl MistakeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MistakeKind::RailPlacement => "rail_placement",
            MistakeKind::WrongLetter => "wrong_letter",
            MistakeKind::PrivateLeak => "private_leak",
            MistakeKind::Breach => "breach",
            MistakeKind::CriticalBreach => "critical_breach",
        }
    }
}

/// Narrative beats tied to puzzle milestones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedEvent {
    /// The agent sent its public mixture; carries the private colour label.
    DhExchangeStep { secret: String },
    /// First bad packet slipped through during the current attempt.
    MitmFirstBreach,
}

/// A bus record tagged with a bus-wide sequence number.
///
/// `seq` never resets, so subscribers can tell a repeated event of the same
/// kind apart from one they already handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stamped<T> {
    pub seq: u64,
    pub at: Millis,
    pub value: T,
}

/// Identifies one play-through of a mini-game engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AttemptId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// Unique id of an in-flight packet within the wave-defense engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PacketId(pub u32);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a pending timer will do when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Spawn,
    Transit(PacketId),
    Completion,
}

/// A timer owned by exactly one engine attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameTimer {
    pub attempt: AttemptId,
    pub kind: TimerKind,
}

/// Outputs of an engine transition, applied by the session in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Schedule `timer` to fire `after` milliseconds from the current time.
    Schedule { after: Millis, timer: GameTimer },
    Mistake(MistakeKind),
    Event(ScriptedEvent),
    /// The attempt ended in failure; campaign progress is untouched.
    AttemptFailed(MissionId),
    /// Signal campaign completion for the mission.
    Completed(MissionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mission_id_parses_case_insensitively() {
        assert_eq!("MITM".parse::<MissionId>(), Ok(MissionId::Mitm));
        assert_eq!(" rail-fence ".parse::<MissionId>(), Ok(MissionId::RailFence));
        assert!("enigma".parse::<MissionId>().is_err());
    }

    #[test]
    fn mission_id_serializes_as_kebab_case() {
        let json = serde_json::to_string(&MissionId::DiffieHellman).expect("serialize");
        assert_eq!(json, "\"diffie-hellman\"");
    }
}
