//! Advisory controller.
//!
//! The advisor derives its transcript and option menu from campaign and bus
//! snapshots. It remembers the last mission epoch and the last bus sequence
//! numbers it handled, so each mission change, mistake and scripted event is
//! reacted to exactly once no matter how often `observe` runs.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::core::bus::BusState;
use crate::core::campaign::CampaignState;
use crate::core::knowledge::{Knowledge, Topic, fallback_reply};
use crate::core::types::{MissionId, MistakeKind, ScriptedEvent};

pub const DEFAULT_MISTAKE_THRESHOLD: u32 = 3;

const BASE_GREETING: &str = "Agent, you are back at Base. Choose a mission from the map to begin.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Advisor,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptLine {
    /// Monotonic across transcript resets.
    pub id: u64,
    pub sender: Sender,
    pub text: String,
    /// The text came from the text-generation model.
    pub generated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisorAction {
    Objective,
    Rules,
    Explain,
    Hint,
    Dismiss,
    Help,
}

impl AdvisorAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AdvisorAction::Objective => "objective",
            AdvisorAction::Rules => "rules",
            AdvisorAction::Explain => "explain",
            AdvisorAction::Hint => "hint",
            AdvisorAction::Dismiss => "dismiss",
            AdvisorAction::Help => "help",
        }
    }
}

impl fmt::Display for AdvisorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdvisorAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "objective" => Ok(AdvisorAction::Objective),
            "rules" => Ok(AdvisorAction::Rules),
            "explain" => Ok(AdvisorAction::Explain),
            "hint" => Ok(AdvisorAction::Hint),
            "dismiss" => Ok(AdvisorAction::Dismiss),
            "help" => Ok(AdvisorAction::Help),
            other => Err(format!("unknown advisor action '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdvisorOption {
    pub label: &'static str,
    pub action: AdvisorAction,
}

const fn option(label: &'static str, action: AdvisorAction) -> AdvisorOption {
    AdvisorOption { label, action }
}

const MISSION_OPTIONS: [AdvisorOption; 2] = [
    option("Mission objective?", AdvisorAction::Objective),
    option("Review rules", AdvisorAction::Rules),
];

const ASSIST_OPTIONS: [AdvisorOption; 3] = [
    option("Show hint", AdvisorAction::Hint),
    option("Explain concept", AdvisorAction::Explain),
    option("I'll try again", AdvisorAction::Dismiss),
];

/// Identifies an in-flight free-text query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTicket {
    pub id: u64,
    /// Mission epoch the question was asked in.
    pub epoch: u64,
    pub topic: Topic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionBrief {
    pub id: MissionId,
    pub title: String,
    pub description: String,
}

/// Everything the text generator needs to answer one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisoryQuery {
    pub ticket: QueryTicket,
    pub question: String,
    pub mission: Option<MissionBrief>,
}

impl AdvisoryQuery {
    pub fn knowledge(&self) -> &'static Knowledge {
        self.ticket.topic.knowledge()
    }
}

pub struct Advisor {
    transcript: Vec<TranscriptLine>,
    options: Vec<AdvisorOption>,
    open: bool,
    next_line: u64,
    next_query: u64,
    seen_epoch: Option<u64>,
    seen_error_seq: u64,
    seen_event_seq: u64,
    threshold_armed: bool,
    mistake_threshold: u32,
}

impl Default for Advisor {
    fn default() -> Self {
        Self::new(DEFAULT_MISTAKE_THRESHOLD)
    }
}

impl Advisor {
    pub fn new(mistake_threshold: u32) -> Self {
        Self {
            transcript: Vec::new(),
            options: Vec::new(),
            open: false,
            next_line: 0,
            next_query: 0,
            seen_epoch: None,
            seen_error_seq: 0,
            seen_event_seq: 0,
            threshold_armed: true,
            mistake_threshold: mistake_threshold.max(1),
        }
    }

    /// React to the latest snapshots.
    pub fn observe(&mut self, campaign: &CampaignState, bus: &BusState) {
        if self.seen_epoch != Some(campaign.mission_epoch) {
            self.seen_epoch = Some(campaign.mission_epoch);
            self.reset_for(campaign);
            self.seen_error_seq = bus.last_error.as_ref().map_or(0, |e| e.seq);
            self.seen_event_seq = bus.last_event.as_ref().map_or(0, |e| e.seq);
            self.threshold_armed = bus.mistake_count < self.mistake_threshold;
        }

        if bus.mistake_count < self.mistake_threshold {
            self.threshold_armed = true;
        } else if self.threshold_armed {
            self.threshold_armed = false;
            self.say(
                "Agent, I am seeing repeated deviations in your attempts. Do you need assistance?",
            );
            self.options = ASSIST_OPTIONS.to_vec();
            self.open = true;
        }

        if let Some(error) = bus.last_error.as_ref().filter(|e| e.seq > self.seen_error_seq) {
            self.seen_error_seq = error.seq;
            if let Some(text) = mistake_line(error.value) {
                self.say(text);
                self.open = true;
            }
        }

        if let Some(event) = bus.last_event.as_ref().filter(|e| e.seq > self.seen_event_seq) {
            self.seen_event_seq = event.seq;
            self.narrate(&event.value);
        }
    }

    fn reset_for(&mut self, campaign: &CampaignState) {
        self.transcript.clear();
        match campaign.current_mission() {
            Some(mission) => {
                let text = format!(
                    "Agent, you have engaged mission: {}. Awaiting orders.",
                    mission.title
                );
                self.say(&text);
                self.options = MISSION_OPTIONS.to_vec();
            }
            None => {
                self.say(BASE_GREETING);
                self.options.clear();
            }
        }
    }

    fn narrate(&mut self, event: &ScriptedEvent) {
        match event {
            ScriptedEvent::DhExchangeStep { secret } => {
                let color = if secret.is_empty() { "Red" } else { secret.as_str() };
                let text = format!(
                    "Why is sending the mixture safe? Mixing paint is easy, un-mixing it is not. \
                     The eavesdropper cannot pull your {color} back out of the Yellow."
                );
                self.say(&text);
            }
            ScriptedEvent::MitmFirstBreach => {
                self.say("Agent! A forged packet got through. Do you need tactical assistance?");
                self.options = vec![
                    option("Yes, help", AdvisorAction::Explain),
                    option("No, I have this", AdvisorAction::Dismiss),
                ];
            }
        }
        self.open = true;
    }

    /// Handle a menu selection. Unknown actions get a fixed reply.
    pub fn select_option(&mut self, action: &str, campaign: &CampaignState) {
        let echo = format!(">> CMD: {}", action.trim().to_uppercase());
        self.push(Sender::Agent, echo, false);

        let topic = campaign
            .current
            .map_or(Topic::General, Topic::for_mission);
        let knowledge = topic.knowledge();

        let (text, options) = match action.parse::<AdvisorAction>() {
            Ok(AdvisorAction::Objective) => (
                campaign
                    .current_mission()
                    .map(|m| m.description.clone())
                    .unwrap_or_else(|| "Select a mission from the map.".to_string()),
                vec![option("How does this cipher work?", AdvisorAction::Explain)],
            ),
            Ok(AdvisorAction::Rules | AdvisorAction::Explain) => (
                knowledge.simple_explanation.to_string(),
                vec![
                    option("Show hint", AdvisorAction::Hint),
                    option("Understood", AdvisorAction::Dismiss),
                ],
            ),
            Ok(AdvisorAction::Hint) => (
                format!("HINT: {}", knowledge.hint),
                vec![option("Understood", AdvisorAction::Dismiss)],
            ),
            Ok(AdvisorAction::Dismiss) => (
                "Carry on, Agent.".to_string(),
                vec![option("Help", AdvisorAction::Help)],
            ),
            Ok(AdvisorAction::Help) => (
                "How can I assist?".to_string(),
                vec![
                    option("Mission objective?", AdvisorAction::Objective),
                    option("Explain cipher", AdvisorAction::Explain),
                ],
            ),
            Err(_) => ("Command not recognized.".to_string(), Vec::new()),
        };
        self.push(Sender::Advisor, text, false);
        self.options = options;
    }

    /// Echo a free-text question and prepare the generation request.
    ///
    /// Returns `None` for blank input.
    pub fn begin_query(&mut self, text: &str, campaign: &CampaignState) -> Option<AdvisoryQuery> {
        let question = text.trim();
        if question.is_empty() {
            return None;
        }
        self.push(Sender::Agent, question.to_string(), false);
        self.open = true;

        self.next_query += 1;
        let ticket = QueryTicket {
            id: self.next_query,
            epoch: campaign.mission_epoch,
            topic: Topic::detect(question, campaign.current),
        };
        let mission = campaign.current_mission().map(|m| MissionBrief {
            id: m.id,
            title: m.title.clone(),
            description: m.description.clone(),
        });
        Some(AdvisoryQuery {
            ticket,
            question: question.to_string(),
            mission,
        })
    }

    /// Append the answer to a query.
    ///
    /// A missing or blank reply falls back to the static knowledge base. A
    /// reply for a ticket from an earlier mission epoch is dropped and `false`
    /// is returned.
    pub fn resolve_query(&mut self, ticket: QueryTicket, reply: Option<String>) -> bool {
        if self.seen_epoch != Some(ticket.epoch) {
            return false;
        }
        match reply.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) {
            Some(text) => self.push(Sender::Advisor, text, true),
            None => self.push(Sender::Advisor, fallback_reply(ticket.topic), false),
        }
        self.open = true;
        true
    }

    pub fn transcript(&self) -> &[TranscriptLine] {
        &self.transcript
    }

    pub fn options(&self) -> &[AdvisorOption] {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn say(&mut self, text: &str) {
        self.push(Sender::Advisor, text.to_string(), false);
    }

    fn push(&mut self, sender: Sender, text: String, generated: bool) {
        self.next_line += 1;
        self.transcript.push(TranscriptLine {
            id: self.next_line,
            sender,
            text,
            generated,
        });
    }
}

fn mistake_line(kind: MistakeKind) -> Option<&'static str> {
    match kind {
        MistakeKind::RailPlacement => {
            Some("Negative. The pattern is top, bottom, top, bottom. Try again.")
        }
        MistakeKind::WrongLetter => {
            Some("Incorrect sequence. Decryption needs the characters in exact order.")
        }
        MistakeKind::PrivateLeak => {
            Some("SECURITY ALERT! Never transmit your private colour directly. Mix it first!")
        }
        MistakeKind::Breach => {
            Some("Firewall breached! Enable active countermeasures immediately.")
        }
        MistakeKind::CriticalBreach => None,
    }
}
