//! Line-oriented access to an interactive debugger console
//!
//! The console never says when it has finished answering a command. Two
//! reader tasks publish every stdout/stderr line onto channels and a writer
//! task feeds stdin; [`GdbConsole::collect`] then treats the output as complete
//! once no line has arrived for the idle window.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::{Error, Result};

/// Lines produced by the console in answer to one or more commands
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsoleOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ConsoleOutput {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }

    /// stdout followed by stderr, one line each
    pub fn all_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.iter().chain(self.stderr.iter()).map(String::as_str)
    }
}

/// Channels connected to a running console
pub struct GdbConsole {
    /// Console subprocess, absent when driven over plain channels
    child: Option<Child>,
    stdin: mpsc::UnboundedSender<String>,
    stdout: mpsc::UnboundedReceiver<String>,
    stderr: mpsc::UnboundedReceiver<String>,
    /// Out-of-band pipe errors from the pump tasks
    errors: mpsc::UnboundedReceiver<io::Error>,
    tasks: Vec<JoinHandle<()>>,
    idle_window: Duration,
    prompt: String,
}

impl GdbConsole {
    /// Spawn the console process and start the pump tasks
    pub fn spawn(
        program: &Path,
        args: &[String],
        target: &Path,
        idle_window: Duration,
        prompt: &str,
    ) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(target)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::ConsoleStartFailed(format!("Failed to start {}: {}", program.display(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::ConsoleStartFailed("Failed to get console stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ConsoleStartFailed("Failed to get console stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ConsoleStartFailed("Failed to get console stderr".to_string()))?;

        tracing::info!(
            program = %program.display(),
            debuggee = %target.display(),
            pid = ?child.id(),
            "Started debugger console"
        );

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            pump_lines(stdout, "stdout", stdout_tx, err_tx.clone()),
            pump_lines(stderr, "stderr", stderr_tx, err_tx.clone()),
            pump_commands(stdin, stdin_rx, err_tx),
        ];

        let mut console = Self::from_channels(stdin_tx, stdout_rx, stderr_rx, err_rx, idle_window, prompt);
        console.child = Some(child);
        console.tasks = tasks;
        Ok(console)
    }

    /// Drive a console over existing channels
    pub fn from_channels(
        stdin: mpsc::UnboundedSender<String>,
        stdout: mpsc::UnboundedReceiver<String>,
        stderr: mpsc::UnboundedReceiver<String>,
        errors: mpsc::UnboundedReceiver<io::Error>,
        idle_window: Duration,
        prompt: &str,
    ) -> Self {
        Self {
            child: None,
            stdin,
            stdout,
            stderr,
            errors,
            tasks: Vec::new(),
            idle_window,
            prompt: prompt.to_string(),
        }
    }

    /// Queue one command line for the console
    pub fn send(&self, command: &str) -> Result<()> {
        self.stdin
            .send(command.to_string())
            .map_err(|_| Error::ConsoleClosed)
    }

    /// Collect output until the console has been quiet for the idle window
    ///
    /// Every received line restarts the window. Prompts are stripped and lines
    /// left empty are dropped.
    pub async fn collect(&mut self) -> ConsoleOutput {
        let mut output = ConsoleOutput::default();

        loop {
            tokio::select! {
                Some(line) = self.stdout.recv() => {
                    tracing::trace!("(gdb) {}", line);
                    if let Some(line) = strip_prompt(&line, &self.prompt) {
                        output.stdout.push(line.to_string());
                    }
                }
                Some(line) = self.stderr.recv() => {
                    tracing::trace!("(gdb:err) {}", line);
                    if let Some(line) = strip_prompt(&line, &self.prompt) {
                        output.stderr.push(line.to_string());
                    }
                }
                Some(err) = self.errors.recv() => {
                    tracing::warn!("Error while reading debugger console: {}", err);
                }
                _ = tokio::time::sleep(self.idle_window) => break,
            }
        }

        output
    }
}

impl Drop for GdbConsole {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        // Best-effort since we can't await in drop
        if let Some(child) = &mut self.child {
            let _ = child.start_kill();
        }
    }
}

/// Remove leading prompts; `None` when nothing else is left on the line
fn strip_prompt<'a>(line: &'a str, prompt: &str) -> Option<&'a str> {
    let mut rest = line;
    if !prompt.is_empty() {
        let bare = prompt.trim_end();
        loop {
            if let Some(r) = rest.strip_prefix(prompt) {
                rest = r;
            } else if rest == bare {
                rest = "";
            } else {
                break;
            }
        }
    }
    if rest.trim().is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Publish every line read from `reader` until it closes
fn pump_lines<R>(
    reader: R,
    stream: &'static str,
    lines: mpsc::UnboundedSender<String>,
    errors: mpsc::UnboundedSender<io::Error>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    tracing::debug!(stream, "Debugger console closed");
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if lines.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = errors.send(e);
                    break;
                }
            }
        }
    })
}

/// Write each queued command to `writer`, newline terminated
fn pump_commands<W>(
    writer: W,
    mut commands: mpsc::UnboundedReceiver<String>,
    errors: mpsc::UnboundedSender<io::Error>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);
        while let Some(command) = commands.recv().await {
            tracing::trace!("(gdb) > {}", command);
            let result = async {
                writer.write_all(command.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await
            }
            .await;
            if let Err(e) = result {
                let _ = errors.send(e);
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: &str = "(gdb) ";

    struct Harness {
        console: GdbConsole,
        stdin: mpsc::UnboundedReceiver<String>,
        stdout: mpsc::UnboundedSender<String>,
        stderr: mpsc::UnboundedSender<String>,
        errors: mpsc::UnboundedSender<io::Error>,
    }

    fn harness(idle_ms: u64) -> Harness {
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        Harness {
            console: GdbConsole::from_channels(
                stdin_tx,
                stdout_rx,
                stderr_rx,
                err_rx,
                Duration::from_millis(idle_ms),
                PROMPT,
            ),
            stdin: stdin_rx,
            stdout: stdout_tx,
            stderr: stderr_tx,
            errors: err_tx,
        }
    }

    #[test]
    fn test_strip_prompt() {
        assert_eq!(strip_prompt("(gdb) x = 1", PROMPT), Some("x = 1"));
        assert_eq!(strip_prompt("(gdb) (gdb) Breakpoint 1", PROMPT), Some("Breakpoint 1"));
        assert_eq!(strip_prompt("(gdb) ", PROMPT), None);
        assert_eq!(strip_prompt("(gdb)", PROMPT), None);
        assert_eq!(strip_prompt("", PROMPT), None);
        assert_eq!(strip_prompt("y = (gdb) ", PROMPT), Some("y = (gdb) "));
    }

    #[tokio::test]
    async fn test_collect_returns_burst_once() {
        let mut h = harness(100);
        let stdout = h.stdout.clone();
        let producer = tokio::spawn(async move {
            for line in ["one", "two", "three"] {
                stdout.send(line.to_string()).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        });

        let output = h.console.collect().await;
        assert_eq!(output.stdout, vec!["one", "two", "three"]);

        let again = h.console.collect().await;
        assert!(again.is_empty());
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_collect_on_silent_console_is_empty() {
        let mut h = harness(20);
        let output = h.console.collect().await;
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_collect_separates_streams_and_survives_errors() {
        let mut h = harness(50);
        h.stdout.send("(gdb) $1 = 5".to_string()).unwrap();
        h.errors
            .send(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
            .unwrap();
        h.stderr
            .send("No symbol \"q\" in current context.".to_string())
            .unwrap();

        let output = h.console.collect().await;
        assert_eq!(output.stdout, vec!["$1 = 5"]);
        assert_eq!(output.stderr, vec!["No symbol \"q\" in current context."]);
        assert_eq!(
            output.all_lines().collect::<Vec<_>>(),
            vec!["$1 = 5", "No symbol \"q\" in current context."]
        );
    }

    #[tokio::test]
    async fn test_collect_after_console_exit() {
        let mut h = harness(20);
        h.stdout.send("last words".to_string()).unwrap();
        drop(h.stdout);
        drop(h.stderr);
        drop(h.errors);

        let output = h.console.collect().await;
        assert_eq!(output.stdout, vec!["last words"]);
        assert!(h.console.collect().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_queues_commands_in_order() {
        let mut h = harness(20);
        h.console.send("info locals").unwrap();
        h.console.send("info args").unwrap();
        assert_eq!(h.stdin.recv().await.as_deref(), Some("info locals"));
        assert_eq!(h.stdin.recv().await.as_deref(), Some("info args"));

        drop(h.stdin);
        assert!(matches!(h.console.send("where"), Err(Error::ConsoleClosed)));
    }

    #[tokio::test]
    async fn test_pumps_over_pipes() {
        let (mut console_side, gateway_side) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(gateway_side);

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        let reader = pump_lines(read_half, "stdout", line_tx, err_tx.clone());
        let writer = pump_commands(write_half, cmd_rx, err_tx);

        cmd_tx.send("info source".to_string()).unwrap();
        let mut buf = [0u8; 12];
        tokio::io::AsyncReadExt::read_exact(&mut console_side, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf, b"info source\n");

        console_side
            .write_all(b"Current source file is a.c\r\nSource language is c.\n")
            .await
            .unwrap();
        assert_eq!(
            line_rx.recv().await.as_deref(),
            Some("Current source file is a.c")
        );
        assert_eq!(line_rx.recv().await.as_deref(), Some("Source language is c."));

        drop(console_side);
        drop(cmd_tx);
        reader.await.unwrap();
        writer.await.unwrap();
    }
}
