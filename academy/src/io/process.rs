//! Child processes with a deadline and capped output capture.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Bytes kept from one output stream plus how many were dropped.
#[derive(Debug, Default)]
pub struct Capture {
    pub bytes: Vec<u8>,
    pub dropped: u64,
}

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Capture,
    pub stderr: Capture,
    /// The deadline passed and the child was killed.
    pub timed_out: bool,
}

impl ProcessOutput {
    /// First non-blank stderr line.
    pub fn stderr_headline(&self) -> String {
        self.stderr
            .text()
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

/// Run `cmd` to completion or until `deadline`, writing `input` to its stdin.
///
/// Stdin is written and both output pipes are drained on their own threads,
/// so the deadline holds even for a child that never reads its input. Each
/// output stream keeps at most `capture_limit` bytes.
#[instrument(skip_all, fields(deadline_ms = deadline.as_millis() as u64))]
pub fn run_with_deadline(
    mut cmd: Command,
    input: Option<&[u8]>,
    deadline: Duration,
    capture_limit: usize,
) -> Result<ProcessOutput> {
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    let stdout = capture(child.stdout.take(), capture_limit)?;
    let stderr = capture(child.stderr.take(), capture_limit)?;

    let writer = match input {
        Some(input) => Some(feed_stdin(&mut child, input.to_vec())?),
        None => None,
    };

    let (status, timed_out) = match child.wait_timeout(deadline).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!("deadline passed, killing child");
            child.kill().context("kill command")?;
            (child.wait().context("reap killed command")?, true)
        }
    };

    if let Some(writer) = writer {
        if writer.join().is_err() {
            warn!("stdin writer thread panicked");
        }
    }
    let stdout = finish(stdout).context("collect stdout")?;
    let stderr = finish(stderr).context("collect stderr")?;
    if stdout.dropped > 0 {
        warn!(dropped = stdout.dropped, "stdout exceeded capture limit");
    }
    debug!(code = ?status.code(), timed_out, "child exited");

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn feed_stdin(child: &mut Child, input: Vec<u8>) -> Result<JoinHandle<()>> {
    let mut pipe = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("child stdin is not piped"))?;
    Ok(thread::spawn(move || {
        // Dropping the pipe closes it; a child that exits or is killed gives EPIPE.
        if let Err(err) = pipe.write_all(&input) {
            warn!(%err, "child did not take all of its input");
        }
    }))
}

fn capture<R>(stream: Option<R>, limit: usize) -> Result<JoinHandle<io::Result<Capture>>>
where
    R: Read + Send + 'static,
{
    let stream = stream.ok_or_else(|| anyhow!("child output is not piped"))?;
    Ok(thread::spawn(move || {
        let mut stream = stream;
        let mut bytes = Vec::new();
        (&mut stream).take(limit as u64).read_to_end(&mut bytes)?;
        let dropped = io::copy(&mut stream, &mut io::sink())?;
        Ok(Capture { bytes, dropped })
    }))
}

fn finish(handle: JoinHandle<io::Result<Capture>>) -> Result<Capture> {
    handle
        .join()
        .map_err(|_| anyhow!("capture thread panicked"))?
        .context("read child output")
}
