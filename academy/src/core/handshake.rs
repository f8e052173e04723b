//! Key-exchange engine for the handshake mission.
//!
//! Paint-mixing model of Diffie-Hellman: a mixture is the set of colours that
//! went into it, so mixing is set union and the order of mixing never matters.

use std::collections::BTreeSet;

use crate::core::types::{
    AttemptId, Effect, GameTimer, Millis, MissionId, MistakeKind, ScriptedEvent, TimerKind,
};

/// Base colour both sides agree on in the open.
pub const PUBLIC_COLOR: &str = "Yellow";

/// Private colours the agent can pick from.
pub const SECRET_PALETTE: [&str; 4] = ["Red", "Blue", "Green", "Purple"];

pub type Mixture = BTreeSet<&'static str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeStep {
    Briefing,
    ChooseSecret,
    Mix,
    Exchange,
    Combine,
    Done,
}

impl HandshakeStep {
    pub fn as_str(self) -> &'static str {
        match self {
            HandshakeStep::Briefing => "briefing",
            HandshakeStep::ChooseSecret => "choose-secret",
            HandshakeStep::Mix => "mix",
            HandshakeStep::Exchange => "exchange",
            HandshakeStep::Combine => "combine",
            HandshakeStep::Done => "done",
        }
    }
}

#[derive(Debug)]
pub struct KeyExchange {
    completion_delay_ms: Millis,
    attempt: Option<AttemptId>,
    step: HandshakeStep,
    secret: Option<&'static str>,
    completion_signalled: bool,
}

impl KeyExchange {
    pub fn new(completion_delay_ms: Millis) -> Self {
        Self {
            completion_delay_ms,
            attempt: None,
            step: HandshakeStep::Briefing,
            secret: None,
            completion_signalled: false,
        }
    }

    pub fn start(&mut self, attempt: AttemptId) {
        self.attempt = Some(attempt);
        self.step = HandshakeStep::Briefing;
        self.secret = None;
        self.completion_signalled = false;
    }

    /// Pick the private colour. Only valid while choosing.
    pub fn select_secret(&mut self, label: &str) -> bool {
        if self.step != HandshakeStep::ChooseSecret {
            return false;
        }
        let wanted = label.trim();
        match SECRET_PALETTE
            .iter()
            .find(|color| color.eq_ignore_ascii_case(wanted))
        {
            Some(color) => {
                self.secret = Some(color);
                true
            }
            None => false,
        }
    }

    /// Move to the next step.
    pub fn advance(&mut self) -> Vec<Effect> {
        let Some(attempt) = self.attempt else {
            return Vec::new();
        };
        match self.step {
            HandshakeStep::Briefing => {
                self.step = HandshakeStep::ChooseSecret;
                Vec::new()
            }
            HandshakeStep::ChooseSecret => {
                if self.secret.is_some() {
                    self.step = HandshakeStep::Mix;
                }
                Vec::new()
            }
            HandshakeStep::Mix => {
                self.step = HandshakeStep::Exchange;
                let secret = self.secret.unwrap_or_default().to_string();
                vec![Effect::Event(ScriptedEvent::DhExchangeStep { secret })]
            }
            HandshakeStep::Exchange => {
                self.step = HandshakeStep::Combine;
                Vec::new()
            }
            HandshakeStep::Combine => {
                self.step = HandshakeStep::Done;
                vec![Effect::Schedule {
                    after: self.completion_delay_ms,
                    timer: GameTimer {
                        attempt,
                        kind: TimerKind::Completion,
                    },
                }]
            }
            HandshakeStep::Done => Vec::new(),
        }
    }

    /// The agent tries to put the raw private colour on the public line.
    pub fn transmit_private(&mut self) -> Vec<Effect> {
        match self.step {
            HandshakeStep::Mix | HandshakeStep::Exchange => {
                vec![Effect::Mistake(MistakeKind::PrivateLeak)]
            }
            _ => Vec::new(),
        }
    }

    pub fn on_timer(&mut self, timer: &GameTimer) -> Vec<Effect> {
        if self.attempt != Some(timer.attempt)
            || timer.kind != TimerKind::Completion
            || self.step != HandshakeStep::Done
            || self.completion_signalled
        {
            return Vec::new();
        }
        self.completion_signalled = true;
        vec![Effect::Completed(MissionId::DiffieHellman)]
    }

    pub fn step(&self) -> HandshakeStep {
        self.step
    }

    pub fn attempt(&self) -> Option<AttemptId> {
        self.attempt
    }

    pub fn secret(&self) -> Option<&'static str> {
        self.secret
    }

    /// HQ never uses the same private colour as the agent.
    pub fn hq_secret(&self) -> &'static str {
        if self.secret == Some("Blue") {
            "Red"
        } else {
            "Blue"
        }
    }

    pub fn agent_public(&self) -> Option<Mixture> {
        self.secret.map(|secret| mix(&[PUBLIC_COLOR, secret]))
    }

    pub fn hq_public(&self) -> Mixture {
        mix(&[PUBLIC_COLOR, self.hq_secret()])
    }

    /// Agent side: HQ's public mixture plus the agent's secret.
    pub fn agent_shared(&self) -> Option<Mixture> {
        let secret = self.secret?;
        let mut shared = self.hq_public();
        shared.insert(secret);
        Some(shared)
    }

    /// HQ side: the agent's public mixture plus HQ's secret.
    pub fn hq_shared(&self) -> Option<Mixture> {
        let mut shared = self.agent_public()?;
        shared.insert(self.hq_secret());
        Some(shared)
    }
}

fn mix(colors: &[&'static str]) -> Mixture {
    colors.iter().copied().collect()
}
