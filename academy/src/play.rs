//! Terminal binding for `academy play`.
//!
//! A line-oriented front end: a reader thread forwards input lines, worker
//! threads answer advisor questions, and the loop itself stays
//! single-threaded, feeding wall-clock time into the session on every tick.

use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::advisor::{QueryTicket, Sender as LineSender};
use crate::core::handshake::{HandshakeStep, PUBLIC_COLOR, SECRET_PALETTE};
use crate::core::rail_fence::{PuzzlePhase, TileId};
use crate::core::types::{Millis, MissionId, PacketId};
use crate::core::wave::{PacketKind, WavePhase};
use crate::io::generator::{GenerationError, TextGenerator};
use crate::io::store::KeyValueStore;
use crate::session::{Intent, IntentOutcome, MissionEngine, Notice, Session};

const TICK: Duration = Duration::from_millis(100);

/// One parsed line of player input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayCommand {
    Intent(Intent),
    Option(String),
    Ask(String),
    Complete,
    Status,
    Help,
    Exit,
}

/// Parse a line of player input.
pub fn parse_command(line: &str) -> Result<PlayCommand, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word.to_ascii_lowercase().as_str() {
        "" => return Err("empty command".to_string()),
        "secret" => PlayCommand::Intent(Intent::SelectSecret(required(rest, "secret <colour>")?)),
        "next" | "n" => PlayCommand::Intent(Intent::Advance),
        "leak" => PlayCommand::Intent(Intent::TransmitPrivate),
        "engage" => PlayCommand::Intent(Intent::Engage),
        "retry" => PlayCommand::Intent(Intent::Retry),
        "intercept" | "i" => {
            PlayCommand::Intent(Intent::Intercept(PacketId(number(rest, "intercept <packet>")?)))
        }
        "tile" => PlayCommand::Intent(Intent::SelectTile(TileId(number(rest, "tile <id>")?))),
        "rail" => PlayCommand::Intent(Intent::SelectRail(number(rest, "rail <0|1>")?)),
        "drop" => {
            let mut parts = rest.split_whitespace();
            let usage = "drop <tile> <rail>";
            let tile = number(parts.next().unwrap_or_default(), usage)?;
            let rail = number(parts.next().unwrap_or_default(), usage)?;
            PlayCommand::Intent(Intent::DropTile {
                tile: TileId(tile),
                rail,
            })
        }
        "return" => PlayCommand::Intent(Intent::ReturnTile(TileId(number(rest, "return <tile>")?))),
        "option" | "opt" => PlayCommand::Option(required(rest, "option <action>")?),
        "ask" => PlayCommand::Ask(required(rest, "ask <question>")?),
        "complete" => PlayCommand::Complete,
        "status" => PlayCommand::Status,
        "help" | "?" => PlayCommand::Help,
        "exit" | "quit" => PlayCommand::Exit,
        other => return Err(format!("unknown command '{other}' (type `help`)")),
    };
    Ok(command)
}

fn required(rest: &str, usage: &str) -> Result<String, String> {
    if rest.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(rest.to_string())
    }
}

fn number<T: std::str::FromStr>(raw: &str, usage: &str) -> Result<T, String> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| format!("usage: {usage}"))
}

/// How the play loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayExit {
    Completed,
    Exited,
}

enum LoopEvent {
    Line(String),
    InputClosed,
    Reply(QueryTicket, Result<String, GenerationError>),
}

/// Tracks what has already been printed so only changes are shown.
#[derive(Default)]
struct Screen {
    last_line: u64,
    last_options: String,
    last_status: String,
}

impl Screen {
    fn refresh<S: KeyValueStore>(&mut self, session: &Session<S>, out: &mut impl Write) -> Result<()> {
        for line in session.advisor().transcript() {
            if line.id <= self.last_line {
                continue;
            }
            self.last_line = line.id;
            let prefix = match line.sender {
                LineSender::Advisor => "ADVISOR",
                LineSender::Agent => "AGENT",
            };
            writeln!(out, "{prefix}> {}", line.text)?;
        }

        let options = session
            .advisor()
            .options()
            .iter()
            .map(|o| format!("[{}] {}", o.action, o.label))
            .collect::<Vec<_>>()
            .join("  ");
        if options != self.last_options {
            if !options.is_empty() {
                writeln!(out, "options: {options}")?;
            }
            self.last_options = options;
        }

        let status = session.engine().map(engine_status).unwrap_or_default();
        if status != self.last_status {
            if !status.is_empty() {
                writeln!(out, "{status}")?;
            }
            self.last_status = status;
        }
        out.flush()?;
        Ok(())
    }
}

/// One-line summary of the engine state.
pub fn engine_status(engine: &MissionEngine) -> String {
    match engine {
        MissionEngine::Handshake(engine) => {
            let mut status = format!("handshake: step {}", engine.step().as_str());
            match engine.step() {
                HandshakeStep::ChooseSecret => {
                    let _ = write!(status, " | palette {}", SECRET_PALETTE.join(", "));
                }
                HandshakeStep::Mix | HandshakeStep::Exchange => {
                    if let Some(mixture) = engine.agent_public() {
                        let _ = write!(status, " | your mixture {}", join_set(&mixture));
                    }
                }
                HandshakeStep::Combine | HandshakeStep::Done => {
                    let _ = write!(status, " | HQ sent {}", join_set(&engine.hq_public()));
                    if let Some(shared) = engine.agent_shared() {
                        let _ = write!(status, " | shared secret {}", join_set(&shared));
                    }
                }
                HandshakeStep::Briefing => {
                    let _ = write!(status, " | public colour {PUBLIC_COLOR}");
                }
            }
            status
        }
        MissionEngine::Wave(engine) => {
            let params = engine.params();
            let phase = match engine.phase() {
                WavePhase::Briefing => "briefing (type `engage`)",
                WavePhase::Active => "active",
                WavePhase::Success => "line secured",
                WavePhase::Failed => "failed (type `retry`)",
            };
            let packets = engine
                .in_flight()
                .iter()
                .map(|p| match p.kind {
                    PacketKind::Bug => format!("#{} BUG", p.id),
                    PacketKind::Safe => format!("#{} ok", p.id),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "interception: {phase} | spawned {}/{} | caught {} | missed {}/{} | in flight: {}",
                engine.spawned(),
                params.total,
                engine.caught(),
                engine.missed(),
                params.max_misses,
                if packets.is_empty() { "-" } else { &packets }
            )
        }
        MissionEngine::RailFence(engine) => {
            let pool = engine
                .pool()
                .iter()
                .map(|t| format!("{}:{}", t.id.0, t.letter))
                .collect::<Vec<_>>()
                .join(" ");
            let rail = |index: usize| -> String {
                engine.rail(index).iter().map(|t| t.letter).collect()
            };
            let phase = match engine.phase() {
                PuzzlePhase::Active => "decoding",
                PuzzlePhase::Solved => "decoded",
            };
            format!(
                "payload: {phase} | intercepted {} | top [{}] bottom [{}] | tiles {}",
                engine.ciphertext(),
                rail(0),
                rail(1),
                if pool.is_empty() { "-".to_string() } else { pool }
            )
        }
    }
}

fn join_set(colors: &std::collections::BTreeSet<&'static str>) -> String {
    colors.iter().copied().collect::<Vec<_>>().join("+")
}

const HELP: &str = "\
commands:
  secret <colour> | next | leak            handshake
  engage | retry | intercept <packet>      interception
  tile <id> | rail <0|1> | drop <id> <rail> | return <id>   payload
  option <action> | ask <question>         advisor
  status | complete | help | exit";

/// Run the interactive loop for a mission that is already started.
pub fn run_play<S, G, R, W>(
    session: &mut Session<S>,
    generator: Arc<G>,
    input: R,
    out: &mut W,
) -> Result<PlayExit>
where
    S: KeyValueStore,
    G: TextGenerator + 'static,
    R: BufRead + Send + 'static,
    W: Write,
{
    let started = Instant::now();
    let base = session.now();
    let clock = move || base + started.elapsed().as_millis() as Millis;

    let (tx, rx) = mpsc::channel::<LoopEvent>();
    spawn_reader(input, tx.clone());

    let mut screen = Screen::default();
    let mut pending_queries = 0usize;
    let mut input_open = true;
    screen.refresh(session, out)?;
    writeln!(out, "type `help` for commands")?;

    loop {
        match rx.recv_timeout(TICK) {
            Ok(LoopEvent::Line(line)) => {
                let command = match parse_command(&line) {
                    Ok(command) => command,
                    Err(message) => {
                        writeln!(out, "!! {message}")?;
                        continue;
                    }
                };
                match command {
                    PlayCommand::Exit => {
                        session.exit_mission(clock())?;
                        return Ok(PlayExit::Exited);
                    }
                    PlayCommand::Help => writeln!(out, "{HELP}")?,
                    PlayCommand::Status => {
                        screen.last_status.clear();
                        screen.last_options.clear();
                    }
                    PlayCommand::Complete => {
                        if let Some(mission) = session.campaign().current {
                            session.complete_mission(clock(), mission)?;
                        }
                    }
                    PlayCommand::Option(action) => {
                        session.advance_to(clock())?;
                        session.select_option(&action);
                    }
                    PlayCommand::Ask(text) => {
                        session.advance_to(clock())?;
                        if let Some(pending) = session.begin_query(&text) {
                            pending_queries += 1;
                            let generator = Arc::clone(&generator);
                            let tx = tx.clone();
                            thread::spawn(move || {
                                let result = generator.generate(&pending.request);
                                let _ = tx.send(LoopEvent::Reply(pending.ticket, result));
                            });
                        }
                    }
                    PlayCommand::Intent(intent) => {
                        if session.act(clock(), intent)? == IntentOutcome::Ignored {
                            writeln!(out, "-- nothing happens")?;
                        }
                    }
                }
            }
            Ok(LoopEvent::Reply(ticket, result)) => {
                pending_queries = pending_queries.saturating_sub(1);
                session.advance_to(clock())?;
                session.resolve_query(ticket, result);
            }
            Ok(LoopEvent::InputClosed) => {
                debug!("input closed");
                input_open = false;
            }
            Err(RecvTimeoutError::Timeout) => session.advance_to(clock())?,
            Err(RecvTimeoutError::Disconnected) => input_open = false,
        }

        screen.refresh(session, out)?;
        if let Some(exit) = handle_notices(session, out, clock())? {
            screen.refresh(session, out)?;
            return Ok(exit);
        }
        if !input_open && pending_queries == 0 {
            session.exit_mission(clock())?;
            return Ok(PlayExit::Exited);
        }
    }
}

fn handle_notices<S: KeyValueStore>(
    session: &mut Session<S>,
    out: &mut impl Write,
    now: Millis,
) -> Result<Option<PlayExit>> {
    for notice in session.take_notices() {
        match notice {
            Notice::AttemptFailed(id) => {
                writeln!(out, "** {id}: attempt failed. Type `retry` to go again.")?;
            }
            Notice::MissionCompleted {
                id,
                newly_completed,
                ..
            } => {
                if newly_completed {
                    writeln!(out, "** MISSION COMPLETE: {id}. Returning to base...")?;
                }
                info!(mission = %id, "leaving completed mission");
                session.exit_mission(now)?;
                return Ok(Some(PlayExit::Completed));
            }
        }
    }
    Ok(None)
}

fn spawn_reader<R: BufRead + Send + 'static>(input: R, tx: Sender<LoopEvent>) {
    thread::spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            if tx.send(LoopEvent::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(LoopEvent::InputClosed);
    });
}

/// Print mission briefing text before the loop starts.
pub fn print_briefing<S: KeyValueStore>(
    session: &Session<S>,
    mission: MissionId,
    out: &mut impl Write,
) -> Result<()> {
    let state = session.campaign();
    let def = state
        .mission(mission)
        .with_context(|| format!("mission {mission} is not registered"))?;
    writeln!(out, "== {} ==", def.title)?;
    writeln!(out, "{}", def.description)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_engine_intents() {
        assert_eq!(
            parse_command("intercept 4"),
            Ok(PlayCommand::Intent(Intent::Intercept(PacketId(4))))
        );
        assert_eq!(
            parse_command("  DROP 2 1 "),
            Ok(PlayCommand::Intent(Intent::DropTile {
                tile: TileId(2),
                rail: 1
            }))
        );
        assert_eq!(
            parse_command("secret Purple"),
            Ok(PlayCommand::Intent(Intent::SelectSecret("Purple".to_string())))
        );
        assert_eq!(parse_command("next"), Ok(PlayCommand::Intent(Intent::Advance)));
        assert_eq!(parse_command("return 0"), Ok(PlayCommand::Intent(Intent::ReturnTile(TileId(0)))));
    }

    #[test]
    fn parses_advisor_commands_with_free_text() {
        assert_eq!(
            parse_command("ask what is a rail fence?"),
            Ok(PlayCommand::Ask("what is a rail fence?".to_string()))
        );
        assert_eq!(
            parse_command("opt hint"),
            Ok(PlayCommand::Option("hint".to_string()))
        );
    }

    #[test]
    fn reports_usage_for_bad_arguments() {
        assert_eq!(
            parse_command("intercept x"),
            Err("usage: intercept <packet>".to_string())
        );
        assert_eq!(parse_command("drop 1"), Err("usage: drop <tile> <rail>".to_string()));
        assert_eq!(parse_command("ask"), Err("usage: ask <question>".to_string()));
        assert!(parse_command("dance").is_err());
    }
}
