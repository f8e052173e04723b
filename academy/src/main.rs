//! Cipher Academy command line.
//!
//! Progress lives in `.academy/progress.json` under `--root`, so a campaign
//! can be resumed across runs. `play` runs one mission interactively on the
//! terminal; `ask` puts a single question to the advisor.

use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use academy::core::types::{MissionId, MissionStatus};
use academy::exit_codes;
use academy::io::config::load_config;
use academy::io::generator::CommandGenerator;
use academy::io::init::{AcademyPaths, init_academy};
use academy::io::store::FileStore;
use academy::logging;
use academy::play::{PlayExit, print_briefing, run_play};
use academy::session::Session;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "academy",
    version,
    about = "Cipher Academy: a cryptography training campaign"
)]
struct Cli {
    /// Directory that holds `.academy/`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create `.academy/` with a default config.
    Init {
        /// Rewrite the config if `.academy/` already exists. Progress is kept.
        #[arg(short, long)]
        force: bool,
    },
    /// Set the agent code name.
    Register { name: String },
    /// Show the agent, progress and mission map.
    Status {
        /// Print the campaign snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Ask the advisor one question and print the answer.
    Ask {
        question: String,
        /// Ask from inside this mission instead of from base.
        #[arg(long)]
        mission: Option<MissionId>,
    },
    /// Play a mission on the terminal.
    Play {
        mission: MissionId,
        /// Seed for packet shuffles and word choice.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() {
    logging::init();
    match run(Cli::parse()) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Register { name } => cmd_register(&cli.root, &name),
        Command::Status { json } => cmd_status(&cli.root, json),
        Command::Ask { question, mission } => cmd_ask(&cli.root, &question, mission),
        Command::Play { mission, seed } => cmd_play(&cli.root, mission, seed),
    }
}

fn open_session(root: &Path, seed: Option<u64>) -> Result<Session<FileStore>> {
    let paths = AcademyPaths::new(root);
    if !paths.academy_dir.is_dir() {
        bail!(
            "no .academy directory in {} (run `academy init` first)",
            root.display()
        );
    }
    let config = load_config(&paths.config_path)?;
    let store = FileStore::open(&paths.progress_path)?;
    Session::load(store, config, seed)
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let paths = init_academy(root, force)?;
    println!("initialized {}", paths.academy_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_register(root: &Path, name: &str) -> Result<i32> {
    let mut session = open_session(root, None)?;
    session.register(name)?;
    println!("welcome, agent {}", session.campaign().agent_name);
    Ok(exit_codes::OK)
}

fn cmd_status(root: &Path, json: bool) -> Result<i32> {
    let session = open_session(root, None)?;
    let state = session.campaign();
    if json {
        let payload = serde_json::to_string_pretty(&*state).context("serialize campaign")?;
        println!("{payload}");
        return Ok(exit_codes::OK);
    }

    let agent = if state.is_registered() {
        state.agent_name.as_str()
    } else {
        "(unregistered)"
    };
    println!("agent: {agent}");
    println!("progress: {}/{}", state.progress, state.missions.len());
    for mission in &state.missions {
        let marker = if mission.locked {
            "locked"
        } else {
            match mission.status {
                MissionStatus::Completed => "done",
                MissionStatus::Failed => "failed",
                MissionStatus::Pending | MissionStatus::Active => "open",
            }
        };
        println!("  [{marker:<6}] {:<15} {}", mission.id, mission.title);
    }
    if state.is_finished() {
        println!("campaign complete");
    }
    Ok(exit_codes::OK)
}

fn cmd_ask(root: &Path, question: &str, mission: Option<MissionId>) -> Result<i32> {
    let mut session = open_session(root, None)?;
    if let Some(mission) = mission {
        if !session.start_mission(0, mission)? {
            eprintln!("mission {mission} is locked");
            return Ok(exit_codes::LOCKED);
        }
    }
    let generator = CommandGenerator::from_config(session.config());
    let seen = session
        .advisor()
        .transcript()
        .last()
        .map(|line| line.id)
        .unwrap_or(0);
    session.ask_blocking(question, &generator);

    let mut out = io::stdout().lock();
    for line in session.advisor().transcript() {
        if line.id > seen && line.sender == academy::core::advisor::Sender::Advisor {
            writeln!(out, "{}", line.text)?;
        }
    }
    if mission.is_some() {
        session.exit_mission(0)?;
    }
    Ok(exit_codes::OK)
}

fn cmd_play(root: &Path, mission: MissionId, seed: Option<u64>) -> Result<i32> {
    let mut session = open_session(root, seed)?;
    if !session.campaign().is_registered() {
        bail!("no agent registered (run `academy register <name>` first)");
    }
    if !session.start_mission(0, mission)? {
        eprintln!("mission {mission} is locked");
        return Ok(exit_codes::LOCKED);
    }

    let mut out = io::stdout().lock();
    print_briefing(&session, mission, &mut out)?;
    let generator = Arc::new(CommandGenerator::from_config(session.config()));
    let exit = run_play(&mut session, generator, BufReader::new(io::stdin()), &mut out)?;

    let state = session.campaign();
    match exit {
        PlayExit::Completed => writeln!(
            out,
            "progress: {}/{}{}",
            state.progress,
            state.missions.len(),
            if state.is_finished() { " (campaign complete)" } else { "" }
        )?,
        PlayExit::Exited => writeln!(out, "back at base")?,
    }
    Ok(exit_codes::OK)
}
