//! Wave-defense engine for the interception mission.
//!
//! The engine is a pure state machine: it never reads a clock and never
//! sleeps. Every transition returns the [`Effect`]s the session has to apply,
//! including the timers it wants scheduled. Timers carry the attempt id so a
//! retry silently orphans everything the previous attempt scheduled.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::core::types::{
    AttemptId, Effect, GameTimer, Millis, MissionId, MistakeKind, PacketId, ScriptedEvent,
    TimerKind,
};

/// Attempt parameters. Fixed for the lifetime of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveParams {
    pub total: usize,
    pub bad: usize,
    pub max_misses: u32,
    pub spawn_interval_ms: Millis,
    pub transit_ms: Millis,
    pub completion_delay_ms: Millis,
}

impl Default for WaveParams {
    fn default() -> Self {
        Self {
            total: 15,
            bad: 6,
            max_misses: 2,
            spawn_interval_ms: 1_200,
            transit_ms: 4_000,
            completion_delay_ms: 1_500,
        }
    }
}

impl WaveParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.total == 0 {
            return Err("wave total must be at least 1".to_string());
        }
        if self.bad > self.total {
            return Err(format!(
                "wave bad count {} exceeds total {}",
                self.bad, self.total
            ));
        }
        if self.max_misses == 0 {
            return Err("wave max_misses must be at least 1".to_string());
        }
        if self.spawn_interval_ms == 0 || self.transit_ms == 0 {
            return Err("wave intervals must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavePhase {
    Briefing,
    Active,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Bug,
    Safe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    pub id: PacketId,
    pub kind: PacketKind,
    pub spawned_at: Millis,
}

#[derive(Debug)]
pub struct WaveDefense {
    params: WaveParams,
    rng: StdRng,
    attempt: Option<AttemptId>,
    phase: WavePhase,
    script: Vec<PacketKind>,
    cursor: usize,
    in_flight: Vec<Packet>,
    resolved: HashSet<PacketId>,
    next_packet: u32,
    caught: u32,
    missed: u32,
    breach_warned: bool,
    completion_signalled: bool,
}

impl WaveDefense {
    pub fn new(params: WaveParams, rng: StdRng) -> Self {
        Self {
            params,
            rng,
            attempt: None,
            phase: WavePhase::Briefing,
            script: Vec::new(),
            cursor: 0,
            in_flight: Vec::new(),
            resolved: HashSet::new(),
            next_packet: 0,
            caught: 0,
            missed: 0,
            breach_warned: false,
            completion_signalled: false,
        }
    }

    /// Leave the briefing (or a failed attempt) with a freshly shuffled wave.
    pub fn start(&mut self, attempt: AttemptId) -> Vec<Effect> {
        if !self.can_start() {
            return Vec::new();
        }
        let mut script = vec![PacketKind::Safe; self.params.total];
        for slot in script.iter_mut().take(self.params.bad) {
            *slot = PacketKind::Bug;
        }
        script.shuffle(&mut self.rng);
        self.begin(attempt, script)
    }

    /// Like [`WaveDefense::start`] but with a caller-supplied packet order.
    pub fn start_with_script(
        &mut self,
        attempt: AttemptId,
        script: Vec<PacketKind>,
    ) -> Result<Vec<Effect>, String> {
        self.check_script(&script)?;
        if !self.can_start() {
            return Ok(Vec::new());
        }
        Ok(self.begin(attempt, script))
    }

    /// A script must match the configured wave size and bug count.
    pub fn check_script(&self, script: &[PacketKind]) -> Result<(), String> {
        if script.len() != self.params.total {
            return Err(format!(
                "wave script has {} entries, expected {}",
                script.len(),
                self.params.total
            ));
        }
        let bugs = script.iter().filter(|kind| **kind == PacketKind::Bug).count();
        if bugs != self.params.bad {
            return Err(format!(
                "wave script has {} bugs, expected {}",
                bugs, self.params.bad
            ));
        }
        Ok(())
    }

    /// A new attempt may begin from the briefing or after a failure.
    pub fn can_start(&self) -> bool {
        matches!(self.phase, WavePhase::Briefing | WavePhase::Failed)
    }

    fn begin(&mut self, attempt: AttemptId, script: Vec<PacketKind>) -> Vec<Effect> {
        self.attempt = Some(attempt);
        self.phase = WavePhase::Active;
        self.script = script;
        self.cursor = 0;
        self.in_flight.clear();
        self.resolved.clear();
        self.next_packet = 0;
        self.caught = 0;
        self.missed = 0;
        self.breach_warned = false;
        self.completion_signalled = false;
        vec![self.schedule(self.params.spawn_interval_ms, TimerKind::Spawn)]
    }

    /// The agent clicked a packet.
    ///
    /// Only an in-flight, unresolved bug counts. Safe packets and packets that
    /// are already gone are ignored.
    pub fn intercept(&mut self, id: PacketId) -> Vec<Effect> {
        if self.phase != WavePhase::Active || self.resolved.contains(&id) {
            return Vec::new();
        }
        let Some(index) = self.in_flight.iter().position(|p| p.id == id) else {
            return Vec::new();
        };
        if self.in_flight[index].kind == PacketKind::Safe {
            return Vec::new();
        }
        self.resolved.insert(id);
        self.in_flight.remove(index);
        self.caught += 1;
        self.check_success()
    }

    /// Handle a fired timer. Timers from other attempts are ignored.
    pub fn on_timer(&mut self, timer: &GameTimer, now: Millis) -> Vec<Effect> {
        if self.attempt != Some(timer.attempt) {
            return Vec::new();
        }
        match timer.kind {
            TimerKind::Spawn => self.on_spawn(now),
            TimerKind::Transit(id) => self.on_transit(id),
            TimerKind::Completion => {
                if self.phase == WavePhase::Success && !self.completion_signalled {
                    self.completion_signalled = true;
                    vec![Effect::Completed(MissionId::Mitm)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn on_spawn(&mut self, now: Millis) -> Vec<Effect> {
        if self.phase != WavePhase::Active {
            return Vec::new();
        }
        let Some(kind) = self.script.get(self.cursor).copied() else {
            return Vec::new();
        };
        self.cursor += 1;
        let id = PacketId(self.next_packet);
        self.next_packet += 1;
        self.in_flight.push(Packet {
            id,
            kind,
            spawned_at: now,
        });

        let mut effects = vec![self.schedule(self.params.transit_ms, TimerKind::Transit(id))];
        if self.cursor < self.script.len() {
            effects.push(self.schedule(self.params.spawn_interval_ms, TimerKind::Spawn));
        }
        effects.extend(self.check_success());
        effects
    }

    fn on_transit(&mut self, id: PacketId) -> Vec<Effect> {
        if self.phase != WavePhase::Active {
            return Vec::new();
        }
        if !self.resolved.insert(id) {
            return Vec::new();
        }
        let Some(index) = self.in_flight.iter().position(|p| p.id == id) else {
            return Vec::new();
        };
        let packet = self.in_flight.remove(index);

        let mut effects = Vec::new();
        if packet.kind == PacketKind::Bug {
            self.missed += 1;
            if self.missed >= self.params.max_misses {
                self.phase = WavePhase::Failed;
                return vec![
                    Effect::Mistake(MistakeKind::CriticalBreach),
                    Effect::AttemptFailed(MissionId::Mitm),
                ];
            }
            if !self.breach_warned {
                self.breach_warned = true;
                effects.push(Effect::Mistake(MistakeKind::Breach));
                effects.push(Effect::Event(ScriptedEvent::MitmFirstBreach));
            }
        }
        effects.extend(self.check_success());
        effects
    }

    /// Single authoritative win transition; a no-op once the phase moved on.
    fn check_success(&mut self) -> Vec<Effect> {
        let all_spawned = self.cursor == self.script.len();
        if self.phase == WavePhase::Active
            && all_spawned
            && self.in_flight.is_empty()
            && self.missed < self.params.max_misses
        {
            self.phase = WavePhase::Success;
            return vec![self.schedule(self.params.completion_delay_ms, TimerKind::Completion)];
        }
        Vec::new()
    }

    fn schedule(&self, after: Millis, kind: TimerKind) -> Effect {
        // Only called while an attempt is running.
        let attempt = self.attempt.unwrap_or(AttemptId(0));
        Effect::Schedule {
            after,
            timer: GameTimer { attempt, kind },
        }
    }

    pub fn phase(&self) -> WavePhase {
        self.phase
    }

    pub fn attempt(&self) -> Option<AttemptId> {
        self.attempt
    }

    pub fn params(&self) -> &WaveParams {
        &self.params
    }

    pub fn caught(&self) -> u32 {
        self.caught
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn spawned(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.script.len() - self.cursor
    }

    pub fn in_flight(&self) -> &[Packet] {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn engine() -> WaveDefense {
        WaveDefense::new(WaveParams::default(), StdRng::seed_from_u64(7))
    }

    fn timer(attempt: u64, kind: TimerKind) -> GameTimer {
        GameTimer {
            attempt: AttemptId(attempt),
            kind,
        }
    }

    #[test]
    fn start_shuffles_exactly_the_configured_number_of_bugs() {
        let mut wave = engine();
        let effects = wave.start(AttemptId(1));
        assert_eq!(wave.phase(), WavePhase::Active);
        assert_eq!(
            effects,
            vec![Effect::Schedule {
                after: 1_200,
                timer: timer(1, TimerKind::Spawn),
            }]
        );
        let bugs = wave.script.iter().filter(|k| **k == PacketKind::Bug).count();
        assert_eq!(wave.script.len(), 15);
        assert_eq!(bugs, 6);
    }

    #[test]
    fn start_is_ignored_while_active() {
        let mut wave = engine();
        wave.start(AttemptId(1));
        assert!(wave.start(AttemptId(2)).is_empty());
        assert_eq!(wave.attempt(), Some(AttemptId(1)));
    }

    #[test]
    fn script_must_match_parameters() {
        let mut wave = engine();
        let err = wave
            .start_with_script(AttemptId(1), vec![PacketKind::Bug; 3])
            .expect_err("wrong length");
        assert!(err.contains("expected 15"));

        let err = wave
            .start_with_script(AttemptId(1), vec![PacketKind::Safe; 15])
            .expect_err("wrong bug count");
        assert!(err.contains("0 bugs"));
        assert_eq!(wave.phase(), WavePhase::Briefing);
    }

    #[test]
    fn intercepting_safe_packet_has_no_effect() {
        let mut wave = engine();
        let mut script = vec![PacketKind::Safe; 15];
        for slot in script.iter_mut().skip(1).take(6) {
            *slot = PacketKind::Bug;
        }
        wave.start_with_script(AttemptId(1), script).expect("script");
        wave.on_timer(&timer(1, TimerKind::Spawn), 1_200);
        assert!(wave.intercept(PacketId(0)).is_empty());
        assert_eq!(wave.in_flight().len(), 1);
        assert_eq!(wave.caught(), 0);
    }

    #[test]
    fn intercepted_bug_never_counts_as_missed() {
        let mut wave = engine();
        let mut script = vec![PacketKind::Safe; 15];
        for slot in script.iter_mut().take(6) {
            *slot = PacketKind::Bug;
        }
        wave.start_with_script(AttemptId(1), script).expect("script");
        wave.on_timer(&timer(1, TimerKind::Spawn), 1_200);
        wave.intercept(PacketId(0));
        assert_eq!(wave.caught(), 1);

        let effects = wave.on_timer(&timer(1, TimerKind::Transit(PacketId(0))), 5_200);
        assert!(effects.is_empty());
        assert_eq!(wave.missed(), 0);
        assert!(wave.intercept(PacketId(0)).is_empty());
        assert_eq!(wave.caught(), 1);
    }

    #[test]
    fn timers_from_other_attempts_are_ignored() {
        let mut wave = engine();
        wave.start(AttemptId(2));
        assert!(wave.on_timer(&timer(1, TimerKind::Spawn), 1_200).is_empty());
        assert_eq!(wave.spawned(), 0);
    }

    #[test]
    fn first_miss_warns_once_and_reaching_limit_fails() {
        let params = WaveParams {
            max_misses: 3,
            ..WaveParams::default()
        };
        let mut wave = WaveDefense::new(params, StdRng::seed_from_u64(1));
        let mut script = vec![PacketKind::Safe; 15];
        for slot in script.iter_mut().take(6) {
            *slot = PacketKind::Bug;
        }
        wave.start_with_script(AttemptId(1), script).expect("script");
        for _ in 0..3 {
            wave.on_timer(&timer(1, TimerKind::Spawn), 0);
        }

        let first = wave.on_timer(&timer(1, TimerKind::Transit(PacketId(0))), 0);
        assert_eq!(
            first,
            vec![
                Effect::Mistake(MistakeKind::Breach),
                Effect::Event(ScriptedEvent::MitmFirstBreach),
            ]
        );
        let second = wave.on_timer(&timer(1, TimerKind::Transit(PacketId(1))), 0);
        assert!(second.is_empty());
        assert_eq!(wave.phase(), WavePhase::Active);

        let third = wave.on_timer(&timer(1, TimerKind::Transit(PacketId(2))), 0);
        assert_eq!(
            third,
            vec![
                Effect::Mistake(MistakeKind::CriticalBreach),
                Effect::AttemptFailed(MissionId::Mitm),
            ]
        );
        assert_eq!(wave.phase(), WavePhase::Failed);
        assert!(wave.on_timer(&timer(1, TimerKind::Spawn), 0).is_empty());
    }

    #[test]
    fn completion_timer_signals_once() {
        let params = WaveParams {
            total: 1,
            bad: 1,
            ..WaveParams::default()
        };
        let mut wave = WaveDefense::new(params, StdRng::seed_from_u64(1));
        wave.start(AttemptId(1));
        let spawn = wave.on_timer(&timer(1, TimerKind::Spawn), 1_200);
        assert_eq!(spawn.len(), 1);

        let caught = wave.intercept(PacketId(0));
        assert_eq!(
            caught,
            vec![Effect::Schedule {
                after: 1_500,
                timer: timer(1, TimerKind::Completion),
            }]
        );
        assert_eq!(wave.phase(), WavePhase::Success);
        assert!(wave.intercept(PacketId(0)).is_empty());

        let done = wave.on_timer(&timer(1, TimerKind::Completion), 2_700);
        assert_eq!(done, vec![Effect::Completed(MissionId::Mitm)]);
        assert!(wave.on_timer(&timer(1, TimerKind::Completion), 2_700).is_empty());
    }

    #[test]
    fn retry_after_failure_resets_counters() {
        let params = WaveParams {
            total: 2,
            bad: 1,
            max_misses: 1,
            ..WaveParams::default()
        };
        let mut wave = WaveDefense::new(params, StdRng::seed_from_u64(3));
        wave.start_with_script(AttemptId(1), vec![PacketKind::Bug, PacketKind::Safe])
            .expect("script");
        wave.on_timer(&timer(1, TimerKind::Spawn), 1_200);
        wave.on_timer(&timer(1, TimerKind::Transit(PacketId(0))), 5_200);
        assert_eq!(wave.phase(), WavePhase::Failed);

        wave.start(AttemptId(2));
        assert_eq!(wave.phase(), WavePhase::Active);
        assert_eq!(wave.missed(), 0);
        assert_eq!(wave.spawned(), 0);
        assert_eq!(wave.remaining(), 2);
        assert!(wave.in_flight().is_empty());
    }

    #[test]
    fn validate_rejects_impossible_parameters() {
        let too_many_bugs = WaveParams {
            bad: 16,
            ..WaveParams::default()
        };
        assert!(too_many_bugs.validate().is_err());
        let no_misses = WaveParams {
            max_misses: 0,
            ..WaveParams::default()
        };
        assert!(no_misses.validate().is_err());
        assert!(WaveParams::default().validate().is_ok());
    }
}
