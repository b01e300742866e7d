//! A split-screen pane: one child process on its own pseudo-terminal.
//!
//! A `Pane` is built inert, `start()`ed once, and `terminate()`d once its job is
//! done. Termination is final; a replacement is a new `Pane`. The child handle and
//! the pty master are released exactly once, by `terminate()` or by `Drop`.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use portable_pty::{Child, CommandBuilder, MasterPty, native_pty_system};
use tracing::{debug, info, warn};

use crate::layout::PaneBounds;

pub const DEFAULT_BUFFER_LINES: usize = 10_000;

/// How long a pane gets to exit after SIGTERM before it is killed.
pub const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneState {
    Inert,
    Running,
    Terminated,
}

#[derive(Debug, thiserror::Error)]
pub enum PaneError {
    #[error("pane command is empty")]
    EmptyCommand,
    #[error("pane {0} was already started")]
    AlreadyStarted(String),
    #[error("failed to open pty: {0}")]
    Pty(String),
    #[error("failed to spawn {command}: {reason}")]
    Spawn { command: String, reason: String },
    #[error("pty I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The master side of the pty. `reader` and `writer` are duplicates of the master
/// descriptor; all three close together when this is dropped.
struct PtyHandles {
    master: Box<dyn MasterPty + Send>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
}

pub struct Pane {
    name: String,
    command: Vec<String>,
    bounds: PaneBounds,
    state: PaneState,
    child: Option<Box<dyn Child + Send + Sync>>,
    pty: Option<PtyHandles>,
    exit_code: Option<u32>,
    output: VecDeque<String>,
    /// Trailing output with no newline yet.
    partial: String,
    /// Input accepted by `write` that the pty has not taken yet.
    pending_input: Vec<u8>,
    /// The slave side has hung up: every reader of the tty closed it.
    output_closed: bool,
    capacity: usize,
    terminate_timeout: Duration,
}

impl Pane {
    pub fn new(name: impl Into<String>, command: Vec<String>, bounds: PaneBounds) -> Self {
        Self::with_capacity(name, command, bounds, DEFAULT_BUFFER_LINES)
    }

    pub fn with_capacity(
        name: impl Into<String>,
        command: Vec<String>,
        bounds: PaneBounds,
        capacity: usize,
    ) -> Self {
        Self {
            name: name.into(),
            command,
            bounds,
            state: PaneState::Inert,
            child: None,
            pty: None,
            exit_code: None,
            output: VecDeque::new(),
            partial: String::new(),
            pending_input: Vec::new(),
            output_closed: false,
            capacity,
            terminate_timeout: TERMINATE_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn bounds(&self) -> PaneBounds {
        self.bounds
    }

    pub fn state(&self) -> PaneState {
        self.state
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    pub fn output_lines(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.output.iter().map(String::as_str)
    }

    pub fn buffered_lines(&self) -> usize {
        self.output.len()
    }

    pub fn has_pending_input(&self) -> bool {
        !self.pending_input.is_empty()
    }

    /// True once the child side of the pty has been closed. The process may still
    /// be running (a daemon that detached from its terminal).
    pub fn output_closed(&self) -> bool {
        self.output_closed
    }

    /// The pty master descriptor, for readiness polling. `None` once terminated.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.pty.as_ref().and_then(|pty| pty.master.as_raw_fd())
    }

    /// Open a pty sized to the pane's bounds and run the command on its slave side.
    pub fn start(&mut self) -> Result<(), PaneError> {
        if self.state != PaneState::Inert {
            return Err(PaneError::AlreadyStarted(self.name.clone()));
        }
        let (program, args) = self.command.split_first().ok_or(PaneError::EmptyCommand)?;

        let pair = native_pty_system()
            .openpty(self.bounds.pty_size())
            .map_err(|e| PaneError::Pty(e.to_string()))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PaneError::Pty(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PaneError::Pty(e.to_string()))?;
        if let Some(fd) = pair.master.as_raw_fd() {
            set_nonblocking(fd)?;
        }

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }
        if std::env::var_os("TERM").is_none() {
            cmd.env("TERM", "xterm-256color");
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PaneError::Spawn {
                command: program.clone(),
                reason: e.to_string(),
            })?;
        // Only the child keeps the slave open, so its exit is visible on the master.
        drop(pair.slave);

        info!(
            pane = %self.name,
            command = ?self.command,
            pid = ?child.process_id(),
            cols = self.bounds.width,
            rows = self.bounds.height,
            "pane started"
        );

        self.child = Some(child);
        self.pty = Some(PtyHandles {
            master: pair.master,
            reader,
            writer,
        });
        self.state = PaneState::Running;
        self.apply_window_size()
    }

    /// Send bytes to the child. Whatever the pty cannot take right now is queued,
    /// in order, for `flush_input`. Does nothing once the pty is gone.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.pty.is_none() {
            return Ok(());
        }
        self.pending_input.extend_from_slice(bytes);
        self.flush_input()
    }

    /// Write queued input until the queue is empty or the pty is full. On a hard
    /// error the queue is dropped: the child can no longer receive it.
    pub fn flush_input(&mut self) -> io::Result<()> {
        let Some(pty) = self.pty.as_mut() else {
            self.pending_input.clear();
            return Ok(());
        };
        let mut written = 0;
        let result = loop {
            if written == self.pending_input.len() {
                break pty.writer.flush();
            }
            match pty.writer.write(&self.pending_input[written..]) {
                Ok(0) => break Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.pending_input.drain(..written);
        if result.is_err() {
            self.pending_input.clear();
        }
        result
    }

    /// Read whatever output is ready, up to `max_bytes`, without blocking.
    ///
    /// Returns an empty buffer when nothing is ready, the child has exited, or the
    /// pane has no pty. The bytes are also recorded in the bounded line history.
    pub fn read(&mut self, max_bytes: usize) -> Vec<u8> {
        let Some(pty) = self.pty.as_mut() else {
            return Vec::new();
        };
        let mut buf = vec![0u8; max_bytes];
        let n = loop {
            match pty.reader.read(&mut buf) {
                Ok(0) => {
                    self.output_closed = true;
                    return Vec::new();
                }
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Vec::new(),
                // EIO once the child side has closed.
                Err(e) => {
                    if !self.output_closed {
                        debug!(pane = %self.name, "pty hung up: {e}");
                        self.output_closed = true;
                    }
                    return Vec::new();
                }
            }
        };
        buf.truncate(n);
        self.record_output(&buf);
        buf
    }

    /// True while the child process exists and has not exited.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                if self.exit_code.is_none() {
                    debug!(pane = %self.name, code = status.exit_code(), "pane exited");
                    self.exit_code = Some(status.exit_code());
                }
                false
            }
            Err(e) => {
                debug!(pane = %self.name, "try_wait failed: {e}");
                false
            }
        }
    }

    /// Move/resize the pane and tell the child its new window size.
    pub fn resize(&mut self, bounds: PaneBounds) -> Result<(), PaneError> {
        self.bounds = bounds;
        self.apply_window_size()
    }

    /// Stop the child (SIGTERM, then SIGKILL after the timeout), close the pty and
    /// drop the line history. Calling it again is a no-op.
    pub fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                self.stop_child(child.as_mut());
            }
            if let Ok(Some(status)) = child.try_wait() {
                self.exit_code.get_or_insert(status.exit_code());
            }
        }
        if self.pty.take().is_some() {
            debug!(pane = %self.name, "pty closed");
        }
        self.output.clear();
        self.partial.clear();
        self.pending_input.clear();
        self.state = PaneState::Terminated;
    }

    fn stop_child(&self, child: &mut (dyn Child + Send + Sync)) {
        let Some(pid) = child.process_id() else {
            let _ = child.kill();
            let _ = child.wait();
            return;
        };
        let pid = Pid::from_raw(pid as i32);

        if let Err(e) = kill(pid, Signal::SIGTERM) {
            debug!(pane = %self.name, "SIGTERM failed: {e}");
        }
        let deadline = Instant::now() + self.terminate_timeout;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(None) => std::thread::sleep(EXIT_POLL_INTERVAL),
                _ => return,
            }
        }

        warn!(
            pane = %self.name,
            timeout_ms = self.terminate_timeout.as_millis() as u64,
            "pane ignored SIGTERM, killing"
        );
        if let Err(e) = kill(pid, Signal::SIGKILL) {
            debug!(pane = %self.name, "SIGKILL failed: {e}");
        }
        let _ = child.wait();
    }

    fn apply_window_size(&mut self) -> Result<(), PaneError> {
        let Some(pty) = self.pty.as_ref() else {
            return Ok(());
        };
        pty.master
            .resize(self.bounds.pty_size())
            .map_err(|e| PaneError::Pty(e.to_string()))
    }

    fn record_output(&mut self, bytes: &[u8]) {
        if self.capacity == 0 || bytes.is_empty() {
            return;
        }
        self.partial.push_str(&String::from_utf8_lossy(bytes));
        while let Some(end) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=end).collect();
            self.output
                .push_back(line.trim_end_matches(['\n', '\r']).to_string());
        }
        while self.output.len() > self.capacity {
            self.output.pop_front();
        }
    }
}

impl Drop for Pane {
    fn drop(&mut self) {
        if self.state == PaneState::Running {
            self.terminate();
        }
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io::Error::from)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(io::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> PaneBounds {
        PaneBounds::new(0, 0, 80, 24)
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    /// Read until `needle` shows up or the deadline passes.
    fn read_until(pane: &mut Pane, needle: &str, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        let mut seen = String::new();
        while Instant::now() < deadline {
            let chunk = pane.read(4096);
            seen.push_str(&String::from_utf8_lossy(&chunk));
            if seen.contains(needle) {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        seen
    }

    fn wait_dead(pane: &mut Pane, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if !pane.is_alive() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn new_pane_is_inert() {
        let mut pane = Pane::new("left", sh("true"), bounds());
        assert_eq!(pane.state(), PaneState::Inert);
        assert!(!pane.is_alive());
        assert!(pane.raw_fd().is_none());
        assert!(pane.read(128).is_empty());
        pane.write(b"ignored").unwrap();
    }

    #[test]
    fn empty_command_rejected() {
        let mut pane = Pane::new("left", vec![], bounds());
        assert!(matches!(pane.start(), Err(PaneError::EmptyCommand)));
    }

    #[test]
    fn missing_binary_fails_to_spawn() {
        let mut pane = Pane::new("left", vec!["/nonexistent/splitview-test-bin".into()], bounds());
        assert!(matches!(pane.start(), Err(PaneError::Spawn { .. })));
        assert!(pane.raw_fd().is_none());
    }

    #[test]
    fn child_sees_pane_size() {
        let mut pane = Pane::new("left", sh("stty size; sleep 5"), PaneBounds::new(0, 0, 72, 30));
        pane.start().unwrap();
        let out = read_until(&mut pane, "30 72", Duration::from_secs(5));
        assert!(out.contains("30 72"), "got {out:?}");
        pane.terminate();
    }

    #[test]
    fn resize_updates_window_size() {
        let mut pane = Pane::new("left", sh("read _; stty size; sleep 5"), bounds());
        pane.start().unwrap();
        pane.resize(PaneBounds::new(10, 0, 50, 20)).unwrap();
        assert_eq!(pane.bounds(), PaneBounds::new(10, 0, 50, 20));
        pane.write(b"\n").unwrap();
        let out = read_until(&mut pane, "20 50", Duration::from_secs(5));
        assert!(out.contains("20 50"), "got {out:?}");
        pane.terminate();
    }

    #[test]
    fn write_reaches_child() {
        let mut pane = Pane::new("left", vec!["cat".into()], bounds());
        pane.start().unwrap();
        pane.write(b"ping\n").unwrap();
        let out = read_until(&mut pane, "ping\r\n", Duration::from_secs(5));
        assert!(out.contains("ping"));
        assert!(pane.output_lines().any(|l| l.contains("ping")));
        pane.terminate();
    }

    #[test]
    fn large_paste_is_delivered_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let received = dir.path().join("received");
        let script = format!("sleep 0.5; cat > '{}'", received.display());
        let mut pane = Pane::new("left", sh(&script), bounds());
        pane.start().unwrap();

        // 256 KiB of short lines, far more than the pty buffers.
        let payload = format!("{}\n", "x".repeat(63)).repeat(4096);
        pane.write(payload.as_bytes()).unwrap();
        assert!(pane.has_pending_input());

        let deadline = Instant::now() + Duration::from_secs(20);
        while Instant::now() < deadline {
            pane.flush_input().unwrap();
            pane.read(4096);
            let size = std::fs::metadata(&received).map(|m| m.len()).unwrap_or(0);
            if !pane.has_pending_input() && size == payload.len() as u64 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!pane.has_pending_input());
        assert_eq!(std::fs::read_to_string(&received).unwrap(), payload);
        pane.terminate();
    }

    #[test]
    fn detached_child_closes_output() {
        let mut pane = Pane::new("left", sh("exec </dev/null >/dev/null 2>&1; sleep 5"), bounds());
        pane.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && !pane.output_closed() {
            pane.read(4096);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(pane.output_closed());
        assert!(pane.is_alive());
        pane.terminate();
    }

    #[test]
    fn read_without_output_is_empty() {
        let mut pane = Pane::new("left", sh("sleep 5"), bounds());
        pane.start().unwrap();
        assert!(pane.read(1024).is_empty());
        assert!(!pane.output_closed());
        pane.terminate();
    }

    #[test]
    fn exited_child_is_not_alive() {
        let mut pane = Pane::new("left", sh("exit 3"), bounds());
        pane.start().unwrap();
        assert!(wait_dead(&mut pane, Duration::from_secs(5)));
        assert_eq!(pane.exit_code(), Some(3));
        // Reading after exit never errors.
        let _ = pane.read(1024);
    }

    #[test]
    fn output_buffer_is_bounded() {
        let mut pane = Pane::with_capacity("left", sh("seq 1 50; sleep 5"), bounds(), 10);
        pane.start().unwrap();
        read_until(&mut pane, "50\r\n", Duration::from_secs(5));
        assert!(pane.buffered_lines() <= 10);
        assert!(pane.output_lines().any(|l| l.trim() == "50"));
        assert!(!pane.output_lines().any(|l| l.trim() == "1"));
        pane.terminate();
    }

    #[test]
    fn terminate_twice_is_harmless() {
        let mut pane = Pane::new("left", sh("sleep 30"), bounds());
        pane.start().unwrap();
        assert!(pane.is_alive());
        pane.terminate();
        assert_eq!(pane.state(), PaneState::Terminated);
        assert!(!pane.is_alive());
        assert!(pane.raw_fd().is_none());
        pane.terminate();
        assert_eq!(pane.state(), PaneState::Terminated);
        assert_eq!(pane.buffered_lines(), 0);
        pane.write(b"x").unwrap();
        assert!(pane.read(16).is_empty());
    }

    #[test]
    fn terminate_escalates_to_kill() {
        let mut pane = Pane::new("left", sh("trap '' TERM; echo ready; sleep 30"), bounds())
            .with_terminate_timeout(Duration::from_millis(200));
        pane.start().unwrap();
        read_until(&mut pane, "ready", Duration::from_secs(5));
        let started = Instant::now();
        pane.terminate();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(pane.state(), PaneState::Terminated);
    }

    #[test]
    fn terminate_dead_pane_clears_buffer() {
        let mut pane = Pane::new("left", sh("echo bye"), bounds());
        pane.start().unwrap();
        read_until(&mut pane, "bye", Duration::from_secs(5));
        assert!(wait_dead(&mut pane, Duration::from_secs(5)));
        pane.terminate();
        assert_eq!(pane.buffered_lines(), 0);
        assert_eq!(pane.state(), PaneState::Terminated);
    }

    #[test]
    fn terminated_pane_cannot_restart() {
        let mut pane = Pane::new("left", sh("true"), bounds());
        pane.start().unwrap();
        pane.terminate();
        assert!(matches!(pane.start(), Err(PaneError::AlreadyStarted(_))));
    }
}
