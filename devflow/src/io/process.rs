//! Child process execution with a timeout and bounded output capture.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Stdout decoded lossily, trailing whitespace removed.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim_end().to_string()
    }

    /// Stderr decoded lossily, trimmed; used in failure messages.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }
}

/// How long reader threads may keep draining after the child is gone.
///
/// A grandchild that inherited the pipes can hold them open indefinitely; past
/// this grace its output is abandoned.
const READER_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

type Captured = (Vec<u8>, usize);

/// Run `cmd` to completion or until `timeout` elapses, feeding it `stdin` if given.
///
/// Stdout and stderr are drained on reader threads while the child runs so a chatty child
/// cannot block on a full pipe. At most `output_limit_bytes` of each stream is kept; the rest is
/// counted in the `*_truncated` fields. A child that exceeds the timeout is killed and reported
/// with `timed_out = true`. Output still open after the child is gone (held by a grandchild) is
/// abandoned, so the call never outlives `timeout` by more than a short grace.
#[instrument(skip_all, fields(timeout = ?timeout, output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };
    let started = Instant::now();

    let result = supervise(&mut child, stdin, started, timeout, output_limit_bytes);
    if result.is_err() {
        reap(&mut child);
    }
    result
}

fn supervise(
    child: &mut Child,
    stdin: Option<&[u8]>,
    started: Instant,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (tx, rx) = mpsc::channel();
    spawn_reader(stdout, Stream::Stdout, output_limit_bytes, tx.clone());
    spawn_reader(stderr, Stream::Stderr, output_limit_bytes, tx);

    if let Some(input) = stdin {
        let child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        spawn_writer(child_stdin, input.to_vec());
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout = ?timeout, "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let reader_deadline = (started + timeout).max(Instant::now() + READER_GRACE);
    let (stdout, stderr) = collect_output(&rx, reader_deadline)?;
    let abandoned = stdout.is_none() || stderr.is_none();
    if abandoned {
        warn!("output pipes held open after the command exited, abandoning readers");
    }
    let (stdout, stdout_truncated) = stdout.unwrap_or_default();
    let (stderr, stderr_truncated) = stderr.unwrap_or_default();

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, abandoned, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out: timed_out || abandoned,
    })
}

/// Kill and wait for a child that is being given up on.
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(err = %e, "kill after failure");
    }
    if let Err(e) = child.wait() {
        debug!(err = %e, "wait after failure");
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    reader: R,
    stream: Stream,
    limit: usize,
    tx: mpsc::Sender<(Stream, Result<Captured>)>,
) {
    thread::spawn(move || {
        let captured = read_stream_limited(reader, limit);
        // The receiver is gone once the output has been abandoned.
        let _ = tx.send((stream, captured));
    });
}

/// Feed stdin off the calling thread; a child that never reads cannot stall the wait.
fn spawn_writer(mut child_stdin: ChildStdin, input: Vec<u8>) {
    thread::spawn(move || {
        // A child that exits without reading stdin closes the pipe early.
        if let Err(e) = child_stdin.write_all(&input)
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            warn!(err = %e, "write stdin");
        }
    });
}

/// Gather both streams, giving up on whichever is still open at `deadline`.
fn collect_output(
    rx: &mpsc::Receiver<(Stream, Result<Captured>)>,
    deadline: Instant,
) -> Result<(Option<Captured>, Option<Captured>)> {
    let mut stdout = None;
    let mut stderr = None;
    while stdout.is_none() || stderr.is_none() {
        let wait = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok((Stream::Stdout, captured)) => stdout = Some(captured.context("read stdout")?),
            Ok((Stream::Stderr, captured)) => stderr = Some(captured.context("read stderr")?),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("output reader thread panicked"));
            }
        }
    }
    Ok((stdout, stderr))
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_from_stdin() {
        let out = run_command_with_timeout(
            sh("cat"),
            Some(b"hello\n"),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert!(out.success());
        assert_eq!(out.stdout_text(), "hello");
    }

    #[test]
    fn truncates_beyond_limit() {
        let out = run_command_with_timeout(
            sh("printf 'abcdefghij'"),
            None,
            Duration::from_secs(10),
            4,
        )
        .expect("run");
        assert_eq!(out.stdout, b"abcd");
        assert_eq!(out.stdout_truncated, 6);
    }

    #[test]
    fn kills_on_timeout() {
        let started = Instant::now();
        let out = run_command_with_timeout(sh("sleep 5"), None, Duration::from_millis(100), 1024)
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn timeout_is_not_extended_by_grandchild_holding_pipes() {
        let started = Instant::now();
        let out = run_command_with_timeout(
            sh("sleep 4; echo late"),
            Some(b"ignored"),
            Duration::from_millis(200),
            1024,
        )
        .expect("run");
        assert!(out.timed_out);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn background_child_does_not_hold_up_a_finished_command() {
        let started = Instant::now();
        let out = run_command_with_timeout(
            sh("sleep 4 & echo done"),
            None,
            Duration::from_millis(500),
            1024,
        )
        .expect("run");
        assert_eq!(out.status.code(), Some(0));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn large_unread_stdin_does_not_block() {
        let input = vec![b'x'; 1 << 20];
        let out = run_command_with_timeout(
            sh("echo skipped"),
            Some(&input),
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert!(out.status.success());
        assert_eq!(out.stdout_text(), "skipped");
    }

    #[test]
    fn reports_nonzero_exit() {
        let out = run_command_with_timeout(
            sh("echo boom >&2; exit 3"),
            None,
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.stderr_text(), "boom");
    }
}
