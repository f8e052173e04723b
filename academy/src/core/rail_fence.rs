//! Two-rail transposition puzzle for the payload mission.
//!
//! The agent rebuilds the target word by placing letter tiles in zig-zag
//! order: placement `k` must hold `target[k]` and sit on rail `k % 2`. The
//! validation core is [`RailFence::place`]; selection and drag bindings both
//! route through it.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::core::types::{AttemptId, Effect, GameTimer, Millis, MissionId, MistakeKind, TimerKind};

pub const DEFAULT_WORDS: [&str; 6] = [
    "CIPHER",
    "SECRET",
    "SIGNAL",
    "ENIGMA",
    "PAYLOAD",
    "HELLOWORLD",
];

pub const RAIL_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub id: TileId,
    pub letter: char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuzzlePhase {
    Active,
    Solved,
}

/// Outcome of one placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Accepted { index: usize, rail: usize },
    WrongLetter,
    WrongRail,
    /// Nothing to validate: no attempt, puzzle solved, tile unknown or placed.
    Ignored,
}

/// Check a puzzle word: non-empty, uppercase A-Z only.
pub fn validate_word(word: &str) -> Result<(), String> {
    if word.is_empty() {
        return Err("puzzle word must not be empty".to_string());
    }
    if !word.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(format!("puzzle word '{word}' must contain only A-Z"));
    }
    Ok(())
}

/// Two-rail fence encryption: rail 0 letters followed by rail 1 letters.
pub fn encrypt(word: &str) -> String {
    let even = word.chars().step_by(2);
    let odd = word.chars().skip(1).step_by(2);
    even.chain(odd).collect()
}

#[derive(Debug)]
pub struct RailFence {
    words: Vec<String>,
    rng: StdRng,
    completion_delay_ms: Millis,
    attempt: Option<AttemptId>,
    phase: PuzzlePhase,
    target: Vec<char>,
    pool: Vec<Tile>,
    rails: [Vec<Tile>; RAIL_COUNT],
    order: Vec<TileId>,
    selected: Option<TileId>,
    completion_signalled: bool,
}

impl RailFence {
    pub fn new(words: Vec<String>, rng: StdRng, completion_delay_ms: Millis) -> Self {
        Self {
            words,
            rng,
            completion_delay_ms,
            attempt: None,
            phase: PuzzlePhase::Active,
            target: Vec::new(),
            pool: Vec::new(),
            rails: [Vec::new(), Vec::new()],
            order: Vec::new(),
            selected: None,
            completion_signalled: false,
        }
    }

    /// Start an attempt with a randomly chosen word.
    pub fn start(&mut self, attempt: AttemptId) {
        let word = self
            .words
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| DEFAULT_WORDS[0].to_string());
        self.begin(attempt, &word);
    }

    pub fn start_with_word(&mut self, attempt: AttemptId, word: &str) -> Result<(), String> {
        validate_word(word)?;
        self.begin(attempt, word);
        Ok(())
    }

    fn begin(&mut self, attempt: AttemptId, word: &str) {
        self.attempt = Some(attempt);
        self.phase = PuzzlePhase::Active;
        self.target = word.chars().collect();
        self.pool = self
            .target
            .iter()
            .enumerate()
            .map(|(index, letter)| Tile {
                id: TileId(index),
                letter: *letter,
            })
            .collect();
        self.pool.shuffle(&mut self.rng);
        self.rails = [Vec::new(), Vec::new()];
        self.order.clear();
        self.selected = None;
        self.completion_signalled = false;
    }

    /// Validate and, if correct, apply one placement.
    ///
    /// Letter is checked before rail. A rejected placement changes nothing
    /// except recording the mistake.
    pub fn place(&mut self, tile: TileId, rail: usize) -> (Placement, Vec<Effect>) {
        let Some(attempt) = self.attempt else {
            return (Placement::Ignored, Vec::new());
        };
        if self.phase != PuzzlePhase::Active || rail >= RAIL_COUNT {
            return (Placement::Ignored, Vec::new());
        }
        let Some(pool_index) = self.pool.iter().position(|t| t.id == tile) else {
            return (Placement::Ignored, Vec::new());
        };

        let index = self.order.len();
        let letter = self.pool[pool_index].letter;
        if self.target.get(index) != Some(&letter) {
            return (
                Placement::WrongLetter,
                vec![Effect::Mistake(MistakeKind::WrongLetter)],
            );
        }
        if rail != index % RAIL_COUNT {
            return (
                Placement::WrongRail,
                vec![Effect::Mistake(MistakeKind::RailPlacement)],
            );
        }

        let placed = self.pool.remove(pool_index);
        self.rails[rail].push(placed);
        self.order.push(placed.id);

        let mut effects = Vec::new();
        if self.order.len() == self.target.len() {
            self.phase = PuzzlePhase::Solved;
            effects.push(Effect::Schedule {
                after: self.completion_delay_ms,
                timer: GameTimer {
                    attempt,
                    kind: TimerKind::Completion,
                },
            });
        }
        (Placement::Accepted { index, rail }, effects)
    }

    /// First phase of the two-phase binding. Only pool tiles can be selected.
    pub fn select_tile(&mut self, tile: TileId) -> bool {
        if self.phase != PuzzlePhase::Active || !self.pool.iter().any(|t| t.id == tile) {
            return false;
        }
        self.selected = Some(tile);
        true
    }

    /// Second phase: place the selected tile. The selection is always cleared.
    pub fn select_rail(&mut self, rail: usize) -> (Placement, Vec<Effect>) {
        match self.selected.take() {
            Some(tile) => self.place(tile, rail),
            None => (Placement::Ignored, Vec::new()),
        }
    }

    /// Drag binding: the tile was released over a rail.
    pub fn drop_tile(&mut self, tile: TileId, rail: usize) -> (Placement, Vec<Effect>) {
        self.selected = None;
        self.place(tile, rail)
    }

    /// Move the most recently placed tile back to the pool.
    ///
    /// Only the last placement can be undone, so the rails always hold a
    /// prefix of the zig-zag and the placement index stays the tile count.
    pub fn return_tile(&mut self, tile: TileId) -> bool {
        if self.phase != PuzzlePhase::Active || self.order.last() != Some(&tile) {
            return false;
        }
        self.order.pop();
        for rail in &mut self.rails {
            if let Some(index) = rail.iter().position(|t| t.id == tile) {
                self.pool.push(rail.remove(index));
                return true;
            }
        }
        false
    }

    pub fn on_timer(&mut self, timer: &GameTimer) -> Vec<Effect> {
        if self.attempt != Some(timer.attempt)
            || timer.kind != TimerKind::Completion
            || self.phase != PuzzlePhase::Solved
            || self.completion_signalled
        {
            return Vec::new();
        }
        self.completion_signalled = true;
        vec![Effect::Completed(MissionId::RailFence)]
    }

    pub fn phase(&self) -> PuzzlePhase {
        self.phase
    }

    pub fn attempt(&self) -> Option<AttemptId> {
        self.attempt
    }

    pub fn target(&self) -> String {
        self.target.iter().collect()
    }

    /// The intercepted message shown to the agent.
    pub fn ciphertext(&self) -> String {
        encrypt(&self.target())
    }

    pub fn pool(&self) -> &[Tile] {
        &self.pool
    }

    pub fn rail(&self, rail: usize) -> &[Tile] {
        self.rails.get(rail).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn placed(&self) -> usize {
        self.order.len()
    }

    pub fn selected(&self) -> Option<TileId> {
        self.selected
    }

    /// Letters placed so far, in placement order.
    pub fn decoded(&self) -> String {
        self.target.iter().take(self.order.len()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn puzzle(word: &str) -> RailFence {
        let mut engine = RailFence::new(Vec::new(), StdRng::seed_from_u64(11), 1_500);
        engine.start_with_word(AttemptId(1), word).expect("word");
        engine
    }

    fn tile_for(engine: &RailFence, letter: char) -> TileId {
        engine
            .pool()
            .iter()
            .find(|t| t.letter == letter)
            .map(|t| t.id)
            .expect("tile in pool")
    }

    #[test]
    fn encrypt_reads_rails_top_then_bottom() {
        assert_eq!(encrypt("HELLOWORLD"), "HLOOLELWRD");
        assert_eq!(encrypt("CIPHER"), "CPEIHR");
        assert_eq!(encrypt("A"), "A");
    }

    #[test]
    fn validate_word_requires_uppercase_letters() {
        assert!(validate_word("SIGNAL").is_ok());
        assert!(validate_word("").is_err());
        assert!(validate_word("signal").is_err());
        assert!(validate_word("SIG NAL").is_err());
    }

    #[test]
    fn wrong_letter_is_checked_before_rail() {
        let mut engine = puzzle("AB");
        let b = tile_for(&engine, 'B');
        let (outcome, effects) = engine.place(b, 1);
        assert_eq!(outcome, Placement::WrongLetter);
        assert_eq!(effects, vec![Effect::Mistake(MistakeKind::WrongLetter)]);
        assert_eq!(engine.placed(), 0);
        assert_eq!(engine.pool().len(), 2);
    }

    #[test]
    fn wrong_rail_changes_nothing() {
        let mut engine = puzzle("AB");
        let a = tile_for(&engine, 'A');
        let (outcome, effects) = engine.place(a, 1);
        assert_eq!(outcome, Placement::WrongRail);
        assert_eq!(effects, vec![Effect::Mistake(MistakeKind::RailPlacement)]);
        assert!(engine.rail(1).is_empty());
        assert_eq!(engine.placed(), 0);
    }

    #[test]
    fn accepted_placements_alternate_rails_and_solve() {
        let mut engine = puzzle("CIPHER");
        for (index, letter) in "CIPHER".chars().enumerate() {
            let tile = tile_for(&engine, letter);
            let (outcome, effects) = engine.place(tile, index % 2);
            assert_eq!(
                outcome,
                Placement::Accepted {
                    index,
                    rail: index % 2
                }
            );
            if index < 5 {
                assert!(effects.is_empty());
            } else {
                assert_eq!(effects.len(), 1);
            }
        }
        assert_eq!(engine.phase(), PuzzlePhase::Solved);
        let top: String = engine.rail(0).iter().map(|t| t.letter).collect();
        let bottom: String = engine.rail(1).iter().map(|t| t.letter).collect();
        assert_eq!(top, "CPE");
        assert_eq!(bottom, "IHR");
        assert_eq!(format!("{top}{bottom}"), engine.ciphertext());
    }

    #[test]
    fn two_phase_selection_clears_after_each_attempt() {
        let mut engine = puzzle("AB");
        let b = tile_for(&engine, 'B');
        assert!(engine.select_tile(b));
        let (outcome, _) = engine.select_rail(0);
        assert_eq!(outcome, Placement::WrongLetter);
        assert_eq!(engine.selected(), None);
        assert_eq!(engine.select_rail(0).0, Placement::Ignored);

        let a = tile_for(&engine, 'A');
        engine.select_tile(a);
        assert!(matches!(engine.select_rail(0).0, Placement::Accepted { .. }));
        assert!(!engine.select_tile(a));
    }

    #[test]
    fn drag_binding_uses_the_same_validation() {
        let mut engine = puzzle("AB");
        let a = tile_for(&engine, 'A');
        assert_eq!(engine.drop_tile(a, 1).0, Placement::WrongRail);
        assert_eq!(
            engine.drop_tile(a, 0).0,
            Placement::Accepted { index: 0, rail: 0 }
        );
    }

    #[test]
    fn returning_the_last_tile_moves_only_that_tile() {
        let mut engine = puzzle("SIGNAL");
        let mut placed = Vec::new();
        for (index, letter) in "SIGN".chars().enumerate() {
            let tile = tile_for(&engine, letter);
            engine.place(tile, index % 2);
            placed.push(tile);
        }
        assert!(engine.return_tile(placed[3]));
        assert_eq!(engine.placed(), 3);
        assert_eq!(engine.decoded(), "SIG");
        assert_eq!(engine.pool().len(), 3);
        assert_eq!(engine.rail(0).len(), 2);
        assert_eq!(engine.rail(1).len(), 1);

        // The returned tile can be placed again at the same index.
        assert_eq!(
            engine.place(placed[3], 1).0,
            Placement::Accepted { index: 3, rail: 1 }
        );
    }

    #[test]
    fn earlier_tiles_cannot_be_returned() {
        let mut engine = puzzle("SIGNAL");
        let mut placed = Vec::new();
        for (index, letter) in "SIG".chars().enumerate() {
            let tile = tile_for(&engine, letter);
            engine.place(tile, index % 2);
            placed.push(tile);
        }
        assert!(!engine.return_tile(placed[1]));
        assert_eq!(engine.placed(), 3);
        assert_eq!(engine.pool().len(), 3);

        let unplaced = tile_for(&engine, 'N');
        assert!(!engine.return_tile(unplaced));
    }

    #[test]
    fn start_picks_a_word_from_the_list() {
        let words = vec!["ENIGMA".to_string(), "PAYLOAD".to_string()];
        let mut engine = RailFence::new(words.clone(), StdRng::seed_from_u64(5), 1_500);
        engine.start(AttemptId(3));
        assert!(words.contains(&engine.target()));
        assert_eq!(engine.pool().len(), engine.target().len());
    }

    #[test]
    fn completion_fires_only_after_solving() {
        let mut engine = puzzle("A");
        let timer = GameTimer {
            attempt: AttemptId(1),
            kind: TimerKind::Completion,
        };
        assert!(engine.on_timer(&timer).is_empty());
        let a = tile_for(&engine, 'A');
        engine.place(a, 0);
        assert_eq!(
            engine.on_timer(&timer),
            vec![Effect::Completed(MissionId::RailFence)]
        );
        assert!(engine.on_timer(&timer).is_empty());
    }
}
