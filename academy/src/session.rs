//! Session orchestration: one owned container for the whole game.
//!
//! The session routes intents to the active mini-game engine, fires timers
//! from a virtual clock, applies engine effects to the campaign and the bus,
//! persists progress and lets the advisor observe every change. Callers pass
//! the current time into every entry point; the session never reads a clock.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument, warn};

use crate::core::advisor::{Advisor, AdvisoryQuery, QueryTicket};
use crate::core::bus::{BusState, EventBus};
use crate::core::campaign::{Campaign, CampaignState, CampaignUpdate};
use crate::core::handshake::KeyExchange;
use crate::core::invariants::validate_invariants;
use crate::core::rail_fence::{Placement, RailFence, TileId};
use crate::core::registry::mission_registry;
use crate::core::timers::TimerQueue;
use crate::core::types::{
    AttemptId, Effect, GameTimer, Millis, MissionId, MistakeKind, PacketId, ScriptedEvent,
};
use crate::core::wave::{PacketKind, WaveDefense, WavePhase};
use crate::io::config::AcademyConfig;
use crate::io::generator::{GenerationError, GenerationRequest, TextGenerator};
use crate::io::progress::{load_progress, save_progress};
use crate::io::prompt::render_advisor_request;
use crate::io::store::KeyValueStore;

/// The engine behind the current mission.
#[derive(Debug)]
pub enum MissionEngine {
    Handshake(KeyExchange),
    Wave(WaveDefense),
    RailFence(RailFence),
}

impl MissionEngine {
    fn on_timer(&mut self, timer: &GameTimer, now: Millis) -> Vec<Effect> {
        match self {
            MissionEngine::Handshake(engine) => engine.on_timer(timer),
            MissionEngine::Wave(engine) => engine.on_timer(timer, now),
            MissionEngine::RailFence(engine) => engine.on_timer(timer),
        }
    }

    pub fn mission(&self) -> MissionId {
        match self {
            MissionEngine::Handshake(_) => MissionId::DiffieHellman,
            MissionEngine::Wave(_) => MissionId::Mitm,
            MissionEngine::RailFence(_) => MissionId::RailFence,
        }
    }
}

/// Player input for the active mini-game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SelectSecret(String),
    Advance,
    TransmitPrivate,
    Engage,
    Retry,
    Intercept(PacketId),
    SelectTile(TileId),
    SelectRail(usize),
    DropTile { tile: TileId, rail: usize },
    ReturnTile(TileId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    Applied,
    /// The intent was understood but wrong; a mistake was recorded.
    Rejected,
    /// Not applicable to the current engine or state.
    Ignored,
}

/// Things the host should tell the player about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    MissionCompleted {
        id: MissionId,
        newly_completed: bool,
        progress_advanced: bool,
    },
    AttemptFailed(MissionId),
}

/// A free-text question waiting for the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub ticket: QueryTicket,
    pub request: GenerationRequest,
}

pub struct Session<S: KeyValueStore> {
    config: AcademyConfig,
    store: S,
    campaign: Campaign,
    bus: EventBus,
    timers: TimerQueue<GameTimer>,
    engine: Option<MissionEngine>,
    advisor: Advisor,
    notices: Vec<Notice>,
    next_attempt: u64,
    now: Millis,
    rng: StdRng,
}

impl<S: KeyValueStore> Session<S> {
    /// Load progress from `store` and build a session at time zero.
    ///
    /// `seed` makes shuffles and word choices reproducible.
    #[instrument(skip_all, fields(seeded = seed.is_some()))]
    pub fn load(store: S, config: AcademyConfig, seed: Option<u64>) -> Result<Self> {
        config.validate()?;
        let progress = load_progress(&store)?;
        let campaign = Campaign::new(mission_registry(), progress);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut session = Self {
            advisor: Advisor::new(config.mistake_threshold),
            config,
            store,
            campaign,
            bus: EventBus::new(),
            timers: TimerQueue::new(),
            engine: None,
            notices: Vec::new(),
            next_attempt: 0,
            now: 0,
            rng,
        };
        session.observe();
        let state = session.campaign.snapshot();
        info!(agent = %state.agent_name, progress = state.progress, "session loaded");
        Ok(session)
    }

    pub fn campaign(&self) -> Arc<CampaignState> {
        self.campaign.snapshot()
    }

    pub fn bus(&self) -> Arc<BusState> {
        self.bus.snapshot()
    }

    pub fn advisor(&self) -> &Advisor {
        &self.advisor
    }

    pub fn engine(&self) -> Option<&MissionEngine> {
        self.engine.as_ref()
    }

    pub fn config(&self) -> &AcademyConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn register(&mut self, name: &str) -> Result<()> {
        let update = self.campaign.register_agent(name).map_err(|err| anyhow!(err))?;
        info!(agent = %name.trim(), "agent registered");
        self.after_campaign_change(update)
    }

    /// Engage a mission. Returns `false` if it is locked or unknown.
    #[instrument(skip(self))]
    pub fn start_mission(&mut self, now: Millis, id: MissionId) -> Result<bool> {
        self.advance_to(now)?;
        let update = self.campaign.start_mission(id);
        if !update.applied {
            debug!("mission locked or unknown, ignoring");
            return Ok(false);
        }
        self.timers.clear();
        self.bus.reset();
        self.engine = Some(self.build_engine(id));
        if let Some(MissionEngine::Handshake(engine)) = &mut self.engine {
            let attempt = next_attempt(&mut self.next_attempt);
            engine.start(attempt);
        } else if let Some(MissionEngine::RailFence(engine)) = &mut self.engine {
            let attempt = next_attempt(&mut self.next_attempt);
            engine.start(attempt);
        }
        info!("mission started");
        self.after_campaign_change(update)?;
        Ok(true)
    }

    /// Back to the campaign map. Pending timers of the mission are dropped.
    pub fn exit_mission(&mut self, now: Millis) -> Result<()> {
        self.advance_to(now)?;
        let update = self.campaign.exit_mission();
        self.timers.clear();
        self.engine = None;
        if update.current_changed {
            self.bus.reset();
            info!("returned to base");
        }
        self.after_campaign_change(update)
    }

    pub fn complete_mission(&mut self, now: Millis, id: MissionId) -> Result<CampaignUpdate> {
        self.advance_to(now)?;
        self.apply_completion(id)
    }

    pub fn record_mistake(&mut self, now: Millis, kind: MistakeKind) -> Result<()> {
        self.advance_to(now)?;
        self.apply_effects(vec![Effect::Mistake(kind)])
    }

    pub fn trigger_event(&mut self, now: Millis, event: ScriptedEvent) -> Result<()> {
        self.advance_to(now)?;
        self.apply_effects(vec![Effect::Event(event)])
    }

    /// Route a player intent to the current engine.
    #[instrument(skip(self))]
    pub fn act(&mut self, now: Millis, intent: Intent) -> Result<IntentOutcome> {
        self.advance_to(now)?;
        let Some(engine) = self.engine.as_mut() else {
            debug!("no active mission, ignoring intent");
            return Ok(IntentOutcome::Ignored);
        };

        let (outcome, effects) = match (engine, intent) {
            (MissionEngine::Handshake(engine), Intent::SelectSecret(label)) => {
                (applied_if(engine.select_secret(&label)), Vec::new())
            }
            (MissionEngine::Handshake(engine), Intent::Advance) => {
                let before = engine.step();
                let effects = engine.advance();
                (applied_if(engine.step() != before), effects)
            }
            (MissionEngine::Handshake(engine), Intent::TransmitPrivate) => {
                let effects = engine.transmit_private();
                let outcome = if effects.is_empty() {
                    IntentOutcome::Ignored
                } else {
                    IntentOutcome::Rejected
                };
                (outcome, effects)
            }
            (MissionEngine::Wave(engine), Intent::Engage) => {
                if engine.phase() != WavePhase::Briefing {
                    (IntentOutcome::Ignored, Vec::new())
                } else {
                    let attempt = next_attempt(&mut self.next_attempt);
                    (IntentOutcome::Applied, engine.start(attempt))
                }
            }
            (MissionEngine::Wave(engine), Intent::Retry) => {
                if engine.phase() != WavePhase::Failed {
                    (IntentOutcome::Ignored, Vec::new())
                } else {
                    if let Some(old) = engine.attempt() {
                        self.timers.retain(|timer| timer.attempt != old);
                    }
                    let attempt = next_attempt(&mut self.next_attempt);
                    let effects = engine.start(attempt);
                    self.campaign.reactivate_mission(MissionId::Mitm);
                    info!(%attempt, "retrying interception");
                    (IntentOutcome::Applied, effects)
                }
            }
            (MissionEngine::Wave(engine), Intent::Intercept(id)) => {
                let caught = engine.caught();
                let effects = engine.intercept(id);
                (applied_if(engine.caught() != caught), effects)
            }
            (MissionEngine::RailFence(engine), Intent::SelectTile(tile)) => {
                (applied_if(engine.select_tile(tile)), Vec::new())
            }
            (MissionEngine::RailFence(engine), Intent::SelectRail(rail)) => {
                placement_outcome(engine.select_rail(rail))
            }
            (MissionEngine::RailFence(engine), Intent::DropTile { tile, rail }) => {
                placement_outcome(engine.drop_tile(tile, rail))
            }
            (MissionEngine::RailFence(engine), Intent::ReturnTile(tile)) => {
                (applied_if(engine.return_tile(tile)), Vec::new())
            }
            (engine, intent) => {
                debug!(mission = %engine.mission(), ?intent, "intent not valid for mission");
                (IntentOutcome::Ignored, Vec::new())
            }
        };

        self.apply_effects(effects)?;
        self.observe();
        Ok(outcome)
    }

    /// Start the interception wave with a fixed packet order.
    ///
    /// Only valid from the briefing or after a failed attempt. A rejected
    /// call leaves the running attempt and its timers untouched.
    pub fn engage_with_script(&mut self, now: Millis, script: Vec<PacketKind>) -> Result<()> {
        self.advance_to(now)?;
        let Some(MissionEngine::Wave(engine)) = self.engine.as_mut() else {
            return Err(anyhow!("interception mission is not active"));
        };
        engine.check_script(&script).map_err(|err| anyhow!(err))?;
        if !engine.can_start() {
            return Err(anyhow!(
                "interception wave cannot be engaged while {:?}",
                engine.phase()
            ));
        }
        if let Some(old) = engine.attempt() {
            self.timers.retain(|timer| timer.attempt != old);
        }
        let retrying = engine.phase() == WavePhase::Failed;
        let attempt = next_attempt(&mut self.next_attempt);
        let effects = engine.start_with_script(attempt, script).map_err(|err| anyhow!(err))?;
        if retrying {
            self.campaign.reactivate_mission(MissionId::Mitm);
        }
        self.apply_effects(effects)
    }

    /// Start the payload puzzle with a fixed word instead of a random one.
    pub fn start_puzzle_with_word(&mut self, now: Millis, word: &str) -> Result<()> {
        self.advance_to(now)?;
        let Some(MissionEngine::RailFence(engine)) = self.engine.as_mut() else {
            return Err(anyhow!("payload mission is not active"));
        };
        self.timers.clear();
        let attempt = next_attempt(&mut self.next_attempt);
        engine.start_with_word(attempt, word).map_err(|err| anyhow!(err))
    }

    /// Fire every timer due at or before `now`, each at its own due time.
    pub fn advance_to(&mut self, now: Millis) -> Result<()> {
        while let Some((due, timer)) = self.timers.pop_due(now) {
            self.now = self.now.max(due);
            let effects = match self.engine.as_mut() {
                Some(engine) => engine.on_timer(&timer, self.now),
                None => Vec::new(),
            };
            self.apply_effects(effects)?;
        }
        self.now = self.now.max(now);
        Ok(())
    }

    pub fn select_option(&mut self, action: &str) {
        let state = self.campaign.snapshot();
        self.advisor.select_option(action, &state);
    }

    /// Echo a question and prepare the generation request.
    ///
    /// If the prompt cannot be rendered the static fallback is appended right
    /// away and `None` is returned, same as for blank input.
    pub fn begin_query(&mut self, text: &str) -> Option<PendingQuery> {
        let state = self.campaign.snapshot();
        let query: AdvisoryQuery = self.advisor.begin_query(text, &state)?;
        match render_advisor_request(&query) {
            Ok(request) => Some(PendingQuery {
                ticket: query.ticket,
                request,
            }),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to render advisor prompt");
                self.advisor.resolve_query(query.ticket, None);
                None
            }
        }
    }

    /// Feed a generator result back. Returns `false` if the reply was stale.
    pub fn resolve_query(
        &mut self,
        ticket: QueryTicket,
        result: Result<String, GenerationError>,
    ) -> bool {
        let reply = match result {
            Ok(text) => Some(text),
            Err(GenerationError::Offline) => {
                debug!("advisor offline, using knowledge base");
                None
            }
            Err(GenerationError::Failed(message)) => {
                warn!(%message, "advisor generation failed, using knowledge base");
                None
            }
        };
        let accepted = self.advisor.resolve_query(ticket, reply);
        if !accepted {
            debug!(ticket = ticket.id, "discarding reply from an earlier mission");
        }
        accepted
    }

    /// Ask and wait for the answer on the calling thread.
    pub fn ask_blocking<G: TextGenerator + ?Sized>(&mut self, text: &str, generator: &G) -> bool {
        match self.begin_query(text) {
            Some(pending) => {
                let result = generator.generate(&pending.request);
                self.resolve_query(pending.ticket, result)
            }
            None => false,
        }
    }

    fn build_engine(&mut self, id: MissionId) -> MissionEngine {
        let rng = StdRng::seed_from_u64(self.rng.r#gen::<u64>());
        match id {
            MissionId::DiffieHellman => {
                MissionEngine::Handshake(KeyExchange::new(self.config.completion_delay_ms))
            }
            MissionId::Mitm => MissionEngine::Wave(WaveDefense::new(self.config.wave_params(), rng)),
            MissionId::RailFence => MissionEngine::RailFence(RailFence::new(
                self.config.rail_fence.words.clone(),
                rng,
                self.config.completion_delay_ms,
            )),
        }
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::Schedule { after, timer } => {
                    self.timers.schedule(self.now + after, timer);
                }
                Effect::Mistake(kind) => {
                    debug!(kind = kind.as_str(), "mistake recorded");
                    self.bus.record_mistake(kind, self.now);
                }
                Effect::Event(event) => {
                    debug!(?event, "scripted event");
                    self.bus.trigger_event(event, self.now);
                }
                Effect::AttemptFailed(id) => {
                    info!(mission = %id, "attempt failed");
                    self.campaign.fail_mission(id);
                    self.notices.push(Notice::AttemptFailed(id));
                }
                Effect::Completed(id) => {
                    self.apply_completion(id)?;
                }
            }
            self.observe();
        }
        Ok(())
    }

    fn apply_completion(&mut self, id: MissionId) -> Result<CampaignUpdate> {
        let update = self.campaign.complete_mission(id);
        if !update.applied {
            debug!(mission = %id, "unknown mission, ignoring completion");
            return Ok(update);
        }
        info!(
            mission = %id,
            progress = self.campaign.snapshot().progress,
            advanced = update.progress_advanced,
            "mission completed"
        );
        self.notices.push(Notice::MissionCompleted {
            id,
            newly_completed: update.newly_completed,
            progress_advanced: update.progress_advanced,
        });
        self.after_campaign_change(update)?;
        Ok(update)
    }

    fn after_campaign_change(&mut self, update: CampaignUpdate) -> Result<()> {
        let state = self.campaign.snapshot();
        let errors = validate_invariants(&state);
        if !errors.is_empty() {
            warn!(errors = ?errors, "campaign invariant violations");
        }
        if update.needs_persist() {
            save_progress(&mut self.store, &state.progress_record())?;
        }
        self.observe();
        Ok(())
    }

    fn observe(&mut self) {
        let campaign = self.campaign.snapshot();
        let bus = self.bus.snapshot();
        self.advisor.observe(&campaign, &bus);
    }
}

fn next_attempt(counter: &mut u64) -> AttemptId {
    *counter += 1;
    AttemptId(*counter)
}

fn applied_if(applied: bool) -> IntentOutcome {
    if applied {
        IntentOutcome::Applied
    } else {
        IntentOutcome::Ignored
    }
}

fn placement_outcome((placement, effects): (Placement, Vec<Effect>)) -> (IntentOutcome, Vec<Effect>) {
    let outcome = match placement {
        Placement::Accepted { .. } => IntentOutcome::Applied,
        Placement::WrongLetter | Placement::WrongRail => IntentOutcome::Rejected,
        Placement::Ignored => IntentOutcome::Ignored,
    };
    (outcome, effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handshake::HandshakeStep;
    use crate::core::types::MissionStatus;
    use crate::io::progress::PROGRESS_KEY;
    use crate::io::store::MemoryStore;
    use crate::test_support::memory_session;

    fn session(progress: usize) -> Session<MemoryStore> {
        memory_session(progress)
    }

    #[test]
    fn locked_mission_cannot_be_started() {
        let mut session = session(0);
        assert!(!session.start_mission(0, MissionId::RailFence).expect("start"));
        assert!(session.engine().is_none());
        assert_eq!(session.campaign().current, None);
    }

    #[test]
    fn handshake_completes_after_delay_and_persists() {
        let mut session = session(0);
        session.start_mission(0, MissionId::DiffieHellman).expect("start");
        session.act(10, Intent::Advance).expect("act");
        session
            .act(20, Intent::SelectSecret("Red".to_string()))
            .expect("act");
        for at in [30, 40, 50, 60] {
            session.act(at, Intent::Advance).expect("act");
        }
        let Some(MissionEngine::Handshake(engine)) = session.engine() else {
            panic!("handshake engine expected");
        };
        assert_eq!(engine.step(), HandshakeStep::Done);
        assert_eq!(session.campaign().progress, 0);

        session.advance_to(1_559).expect("advance");
        assert_eq!(session.campaign().progress, 0);
        session.advance_to(1_560).expect("advance");
        assert_eq!(session.campaign().progress, 1);
        assert_eq!(
            session.store().get(PROGRESS_KEY).expect("get"),
            Some("1".to_string())
        );
        assert_eq!(
            session.take_notices(),
            vec![Notice::MissionCompleted {
                id: MissionId::DiffieHellman,
                newly_completed: true,
                progress_advanced: true,
            }]
        );
    }

    #[test]
    fn exit_drops_pending_completion() {
        let mut session = session(0);
        session.start_mission(0, MissionId::DiffieHellman).expect("start");
        session.act(0, Intent::Advance).expect("act");
        session
            .act(0, Intent::SelectSecret("Blue".to_string()))
            .expect("act");
        for _ in 0..4 {
            session.act(0, Intent::Advance).expect("act");
        }
        assert_eq!(session.pending_timers(), 1);
        session.exit_mission(100).expect("exit");
        assert_eq!(session.pending_timers(), 0);
        session.advance_to(10_000).expect("advance");
        assert_eq!(session.campaign().progress, 0);
        assert_eq!(
            session.campaign().missions[0].status,
            MissionStatus::Pending
        );
    }

    #[test]
    fn leaking_private_colour_is_rejected_and_recorded() {
        let mut session = session(0);
        session.start_mission(0, MissionId::DiffieHellman).expect("start");
        session.act(0, Intent::Advance).expect("act");
        session
            .act(0, Intent::SelectSecret("Green".to_string()))
            .expect("act");
        session.act(0, Intent::Advance).expect("act");
        let outcome = session.act(5, Intent::TransmitPrivate).expect("act");
        assert_eq!(outcome, IntentOutcome::Rejected);
        assert_eq!(session.bus().mistake_count, 1);
        assert!(
            session
                .advisor()
                .transcript()
                .iter()
                .any(|line| line.text.contains("SECURITY ALERT"))
        );
    }

    #[test]
    fn intents_for_other_missions_are_ignored() {
        let mut session = session(0);
        assert_eq!(
            session.act(0, Intent::Engage).expect("act"),
            IntentOutcome::Ignored
        );
        session.start_mission(0, MissionId::DiffieHellman).expect("start");
        assert_eq!(
            session.act(0, Intent::Intercept(PacketId(0))).expect("act"),
            IntentOutcome::Ignored
        );
    }

    #[test]
    fn clock_never_moves_backwards() {
        let mut session = session(0);
        session.advance_to(500).expect("advance");
        session.advance_to(100).expect("advance");
        assert_eq!(session.now(), 500);
    }

    #[test]
    fn puzzle_with_fixed_word_solves_through_intents() {
        let mut session = session(2);
        session.start_mission(0, MissionId::RailFence).expect("start");
        session.start_puzzle_with_word(0, "AB").expect("word");
        let tiles: Vec<(TileId, char)> = match session.engine() {
            Some(MissionEngine::RailFence(engine)) => {
                engine.pool().iter().map(|t| (t.id, t.letter)).collect()
            }
            _ => panic!("rail fence engine expected"),
        };
        let tile = |letter: char| {
            tiles
                .iter()
                .find(|(_, l)| *l == letter)
                .map(|(id, _)| *id)
                .expect("tile")
        };

        assert_eq!(
            session
                .act(0, Intent::DropTile { tile: tile('B'), rail: 0 })
                .expect("act"),
            IntentOutcome::Rejected
        );
        session.act(0, Intent::SelectTile(tile('A'))).expect("act");
        assert_eq!(
            session.act(0, Intent::SelectRail(0)).expect("act"),
            IntentOutcome::Applied
        );
        session
            .act(0, Intent::DropTile { tile: tile('B'), rail: 1 })
            .expect("act");
        session.advance_to(1_500).expect("advance");
        assert_eq!(session.campaign().progress, 3);
        assert!(session.campaign().is_finished());
    }
}
