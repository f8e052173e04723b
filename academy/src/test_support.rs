//! Test helpers for building sessions, scripted advisors and temp academies.

use std::collections::VecDeque;
use std::sync::Mutex;

use tempfile::TempDir;

use crate::core::wave::PacketKind;
use crate::io::config::AcademyConfig;
use crate::io::generator::{GenerationError, GenerationRequest, TextGenerator};
use crate::io::init::{AcademyPaths, init_academy};
use crate::io::progress::PROGRESS_KEY;
use crate::io::store::{FileStore, MemoryStore};
use crate::session::Session;

/// Seed used by helpers that need reproducible shuffles.
pub const TEST_SEED: u64 = 42;

/// Session over an in-memory store with the given saved progress.
pub fn memory_session(progress: usize) -> Session<MemoryStore> {
    memory_session_with(progress, AcademyConfig::default())
}

/// Same as [`memory_session`] with an explicit config.
pub fn memory_session_with(progress: usize, config: AcademyConfig) -> Session<MemoryStore> {
    let progress = progress.to_string();
    let store = MemoryStore::with_entries([(PROGRESS_KEY, progress.as_str())]);
    Session::load(store, config, Some(TEST_SEED)).expect("load memory session")
}

/// The reference 15-packet wave: six bugs at positions 0, 1, 4, 6, 9 and 12.
pub fn example_wave_script() -> Vec<PacketKind> {
    use PacketKind::{Bug, Safe};
    vec![
        Bug, Bug, Safe, Safe, Bug, Safe, Bug, Safe, Safe, Bug, Safe, Safe, Bug, Safe, Safe,
    ]
}

/// Generator that replays queued results and records each request.
///
/// Once the queue is empty it reports [`GenerationError::Offline`].
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(replies: impl IntoIterator<Item = Result<String, GenerationError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Err(GenerationError::Offline))
    }
}

/// An initialized `.academy/` inside a temp directory.
pub struct TempAcademy {
    pub dir: TempDir,
    pub paths: AcademyPaths,
}

impl TempAcademy {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = init_academy(dir.path(), false).expect("init academy");
        Self { dir, paths }
    }

    /// Open a fresh session over the progress file.
    pub fn session(&self) -> Session<FileStore> {
        let store = FileStore::open(&self.paths.progress_path).expect("open store");
        Session::load(store, AcademyConfig::default(), Some(TEST_SEED)).expect("load session")
    }
}

impl Default for TempAcademy {
    fn default() -> Self {
        Self::new()
    }
}
