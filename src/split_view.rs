//! Session orchestration: decide between split view and dashboard-only, run the
//! two panes side by side, and tear everything down on the way out.
//!
//! ```text
//! idle -> detecting -> fallback ------------------------------> exited
//!                  \-> panes_created -> running -> cleanup -> exited
//! ```

use std::io::{self, IsTerminal, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, info, warn};

use crate::config::{NO_SPLIT_FLAG, SplitViewConfig};
use crate::focus::{BorderStyle, FocusManager, PaneSide};
use crate::layout::{LayoutError, LayoutManager, MAX_RATIO, MIN_RATIO, PaneBounds};
use crate::pane::{Pane, PaneError, PaneState};
use crate::resize::{ResizeDebouncer, ResizeSignal};
use crate::shortcuts::{InputEvent, ShortcutAction, ShortcutParser};
use crate::terminal::TerminalController;

/// Upper bound on one readiness wait, so liveness checks and deferred resizes
/// still run while every source is idle.
pub const POLL_TIMEOUT_MS: u16 = 100;

/// Columns moved per shrink/grow shortcut.
pub const RESIZE_STEP: i32 = 5;

/// Largest read from any one source per loop iteration.
const READ_CHUNK: usize = 4096;

/// Cap on output flushed from a pane after its process exits.
const MAX_TAIL_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Detecting,
    Fallback,
    PanesCreated,
    Running,
    Cleanup,
    Exited,
}

#[derive(Debug, thiserror::Error)]
pub enum SplitViewError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Pane(#[from] PaneError),
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to launch dashboard `{command}`: {source}")]
    Dashboard { command: String, source: io::Error },
}

/// A readiness source registered with the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Input,
    Resize,
    Pane(PaneSide),
}

pub struct SplitViewManager<W: Write> {
    config: SplitViewConfig,
    terminal: TerminalController<W>,
    layout: LayoutManager,
    focus: FocusManager,
    border: BorderStyle,
    shortcuts: ShortcutParser,
    debouncer: ResizeDebouncer,
    left: Option<Pane>,
    right: Option<Pane>,
    /// Split ratio used for terminal-resize recomputation; follows shortcut resizes.
    ratio: f64,
    state: SessionState,
    /// Where the current terminal size comes from.
    size_source: fn() -> io::Result<(u16, u16)>,
}

impl<W: Write> SplitViewManager<W> {
    pub fn new(config: SplitViewConfig, terminal: TerminalController<W>) -> Self {
        Self {
            terminal,
            layout: LayoutManager::new(),
            focus: FocusManager::new(),
            border: BorderStyle::from_config(&config.colors),
            shortcuts: ShortcutParser::new(&config.shortcuts),
            debouncer: ResizeDebouncer::default(),
            left: None,
            right: None,
            ratio: config.ratio,
            state: SessionState::Idle,
            size_source: crossterm::terminal::size,
            config,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub fn focus(&self) -> &FocusManager {
        &self.focus
    }

    #[cfg(test)]
    pub fn terminal(&self) -> &TerminalController<W> {
        &self.terminal
    }

    pub fn pane(&self, side: PaneSide) -> Option<&Pane> {
        match side {
            PaneSide::Left => self.left.as_ref(),
            PaneSide::Right => self.right.as_ref(),
        }
    }

    fn pane_mut(&mut self, side: PaneSide) -> Option<&mut Pane> {
        match side {
            PaneSide::Left => self.left.as_mut(),
            PaneSide::Right => self.right.as_mut(),
        }
    }

    /// Run a whole session against the process's own stdin.
    pub fn run(&mut self) -> Result<i32, SplitViewError> {
        let interactive = io::stdin().is_terminal();
        self.launch(interactive)
    }

    /// Run a whole session. `interactive` says whether stdin is a real terminal.
    /// Returns the exit code for the process.
    pub fn launch(&mut self, interactive: bool) -> Result<i32, SplitViewError> {
        self.set_state(SessionState::Detecting);

        if !interactive {
            info!("stdin is not a terminal, running dashboard only");
            return self.run_fallback();
        }

        if !self.config.use_shell && find_in_path(&self.config.assistant.command).is_none() {
            info!(command = %self.config.assistant.command, "assistant not found on PATH");
            println!("{}", fallback_notice(&self.config));
            std::thread::sleep(Duration::from_millis(self.config.assistant.startup_delay_ms));
            return self.run_fallback();
        }

        let result = self.run_split();
        let cleaned = self.cleanup();
        let code = result?;
        cleaned?;
        Ok(code)
    }

    fn run_fallback(&mut self) -> Result<i32, SplitViewError> {
        self.set_state(SessionState::Fallback);
        let result = run_dashboard_only(&self.config);
        self.set_state(SessionState::Exited);
        result
    }

    fn run_split(&mut self) -> Result<i32, SplitViewError> {
        // Refuse an undersized terminal before touching the screen.
        if !self.layout.validate_minimum_size() {
            let (width, height) = (self.size_source)()?;
            self.layout.check_size(width, height)?;
        }
        self.terminal.enter_alternate_screen()?;
        self.terminal.clear_screen()?;
        let (width, height) = (self.size_source)()?;
        self.create_panes(self.config.left_argv(), self.config.dashboard_argv(), width, height)?;

        let mut resize = ResizeSignal::install()?;
        let stdin = io::stdin();
        self.event_loop(Some(stdin.as_fd()), Some(&mut resize))
    }

    /// Lay out and start both panes, then draw the initial screen. A terminal
    /// below the minimum size aborts here.
    pub fn create_panes(
        &mut self,
        left_command: Vec<String>,
        right_command: Vec<String>,
        width: u16,
        height: u16,
    ) -> Result<(), SplitViewError> {
        let (left_bounds, right_bounds) = self.layout.calculate_split(width, height, self.ratio)?;

        let left_name = if self.config.use_shell {
            "shell".to_string()
        } else {
            self.config.assistant.command.clone()
        };
        let mut left = Pane::new(left_name, left_command, left_bounds);
        left.start()?;
        self.left = Some(left);

        let mut right = Pane::new("tui", right_command, right_bounds);
        right.start()?;
        self.right = Some(right);

        self.focus.register(PaneSide::Left);
        self.focus.register(PaneSide::Right);
        self.focus
            .set_active(Some(PaneSide::from_config(&self.config.active_pane)));
        self.set_state(SessionState::PanesCreated);

        self.redraw()?;
        Ok(())
    }

    /// Multiplex terminal input, resize notifications and both panes' output until
    /// neither pane is alive. Returns the session exit code.
    pub fn event_loop(
        &mut self,
        input: Option<BorrowedFd<'_>>,
        mut resize: Option<&mut ResizeSignal>,
    ) -> Result<i32, SplitViewError> {
        self.set_state(SessionState::Running);
        let mut input = input;
        let mut buf = [0u8; READ_CHUNK];

        loop {
            self.reap_dead_panes()?;
            if !self.any_alive() {
                info!("all panes exited");
                return Ok(0);
            }
            self.process_pending_resize(Instant::now())?;

            let pane_fds: Vec<_> = [PaneSide::Left, PaneSide::Right]
                .into_iter()
                .filter_map(|side| {
                    let pane = self.pane(side)?;
                    // A hung-up pty reports POLLHUP on every call; the liveness
                    // check at the top of the loop still catches the exit.
                    if pane.output_closed() {
                        return None;
                    }
                    let mut events = PollFlags::POLLIN;
                    if pane.has_pending_input() {
                        events |= PollFlags::POLLOUT;
                    }
                    Some((side, pane.raw_fd()?, events))
                })
                .collect();

            let mut sources = Vec::with_capacity(4);
            let mut fds = Vec::with_capacity(4);
            if let Some(fd) = input {
                sources.push(Source::Input);
                fds.push(PollFd::new(fd, PollFlags::POLLIN));
            }
            if let Some(signal) = resize.as_deref() {
                sources.push(Source::Resize);
                fds.push(PollFd::new(signal.as_fd(), PollFlags::POLLIN));
            }
            for (side, raw, events) in pane_fds {
                // SAFETY: the descriptor belongs to a live pane, and panes are only
                // terminated after `fds` is dropped below.
                let fd = unsafe { BorrowedFd::borrow_raw(raw) };
                sources.push(Source::Pane(side));
                fds.push(PollFd::new(fd, events));
            }

            match poll(&mut fds, PollTimeout::from(POLL_TIMEOUT_MS)) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    debug!("poll failed: {e}");
                    continue;
                }
            }

            let wake = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
            let ready: Vec<(Source, PollFlags)> = sources
                .iter()
                .zip(&fds)
                .filter_map(|(source, fd)| fd.revents().map(|r| (*source, r)))
                .filter(|(_, revents)| !revents.is_empty())
                .collect();
            drop(fds);

            for (source, revents) in ready {
                match source {
                    Source::Pane(side) => {
                        if revents.contains(PollFlags::POLLOUT) {
                            self.flush_pane_input(side);
                        }
                        if revents.intersects(wake) {
                            self.pump_pane(side)?;
                        }
                    }
                    _ if !revents.intersects(wake) => {}
                    Source::Input => {
                        let Some(fd) = input else { continue };
                        match nix::unistd::read(fd.as_raw_fd(), &mut buf) {
                            Ok(0) => {
                                debug!("terminal input closed");
                                if let Some(held) = self.shortcuts.flush() {
                                    self.forward(&held);
                                }
                                input = None;
                            }
                            Ok(n) => self.handle_input(&buf[..n])?,
                            Err(Errno::EAGAIN | Errno::EINTR) => {}
                            Err(e) => {
                                warn!("terminal input read failed: {e}");
                                input = None;
                            }
                        }
                    }
                    Source::Resize => {
                        if let Some(signal) = resize.as_deref_mut() {
                            signal.drain();
                        }
                        self.debouncer.notify();
                        self.process_pending_resize(Instant::now())?;
                    }
                }
            }
        }
    }

    /// Route bytes typed at the controlling terminal: shortcuts act on the layout,
    /// everything else goes to the focused pane.
    pub fn handle_input(&mut self, bytes: &[u8]) -> Result<(), SplitViewError> {
        for event in self.shortcuts.feed(bytes) {
            match event {
                InputEvent::Forward(data) => self.forward(&data),
                InputEvent::Shortcut(action) => self.apply_shortcut(action)?,
            }
        }
        Ok(())
    }

    fn forward(&mut self, data: &[u8]) {
        if !self.focus.is_consistent() {
            warn!(
                active = ?self.focus.active(),
                panes = ?self.focus.panes(),
                "focus points at a pane outside the focus set"
            );
        }
        let Some(side) = self.focus.active() else {
            return;
        };
        if let Some(pane) = self.pane_mut(side) {
            if let Err(e) = pane.write(data) {
                debug!(pane = %pane.name(), "write failed: {e}");
            }
        }
    }

    fn apply_shortcut(&mut self, action: ShortcutAction) -> Result<(), SplitViewError> {
        debug!(?action, "shortcut");
        match action {
            ShortcutAction::SwitchFocus => {
                self.focus.toggle();
                self.render_borders()?;
            }
            ShortcutAction::ShrinkLeft => self.shift_boundary(-RESIZE_STEP)?,
            ShortcutAction::GrowLeft => self.shift_boundary(RESIZE_STEP)?,
        }
        Ok(())
    }

    fn shift_boundary(&mut self, delta: i32) -> Result<(), SplitViewError> {
        let (Some(left), Some(right)) = (self.left.as_ref(), self.right.as_ref()) else {
            return Ok(());
        };
        let (left, right) = self.layout.resize_pane(left.bounds(), right.bounds(), delta);
        let total = f64::from(left.width) + f64::from(right.width);
        if total > 0.0 {
            self.ratio = (f64::from(left.width) / total).clamp(MIN_RATIO, MAX_RATIO);
        }
        self.apply_bounds(left, right);
        self.redraw()?;
        Ok(())
    }

    fn apply_bounds(&mut self, left: PaneBounds, right: PaneBounds) {
        for (side, bounds) in [(PaneSide::Left, left), (PaneSide::Right, right)] {
            if let Some(pane) = self.pane_mut(side) {
                if let Err(e) = pane.resize(bounds) {
                    debug!(pane = %pane.name(), "pty resize failed: {e}");
                }
            }
        }
    }

    fn flush_pane_input(&mut self, side: PaneSide) {
        if let Some(pane) = self.pane_mut(side) {
            if let Err(e) = pane.flush_input() {
                debug!(pane = %pane.name(), "queued input dropped: {e}");
            }
        }
    }

    /// Copy one chunk of a pane's output into its screen region.
    fn pump_pane(&mut self, side: PaneSide) -> Result<(), SplitViewError> {
        let Some(pane) = self.pane_mut(side) else {
            return Ok(());
        };
        let data = pane.read(READ_CHUNK);
        let bounds = pane.bounds();
        self.terminal.write_region(bounds, &data)?;
        Ok(())
    }

    /// Terminate panes whose process has exited and move focus to a survivor.
    fn reap_dead_panes(&mut self) -> Result<(), SplitViewError> {
        let mut reaped = false;
        for side in [PaneSide::Left, PaneSide::Right] {
            let Some(pane) = self.pane_mut(side) else {
                continue;
            };
            if pane.state() != PaneState::Running || pane.is_alive() {
                continue;
            }

            let mut tail = Vec::new();
            loop {
                let chunk = pane.read(READ_CHUNK);
                if chunk.is_empty() || tail.len() >= MAX_TAIL_BYTES {
                    break;
                }
                tail.extend_from_slice(&chunk);
            }
            let last_lines: Vec<&str> = pane.output_lines().rev().take(3).collect();
            info!(
                pane = %pane.name(),
                command = ?pane.command(),
                code = ?pane.exit_code(),
                lines = pane.buffered_lines(),
                last = ?last_lines,
                "pane exited"
            );
            let bounds = pane.bounds();
            pane.terminate();
            self.terminal.write_region(bounds, &tail)?;

            self.focus.unregister(side);
            if !self.focus.is_consistent() {
                self.focus.set_active(self.focus.panes().first().copied());
            }
            reaped = true;
        }
        if reaped && self.any_alive() {
            self.render_borders()?;
        }
        Ok(())
    }

    fn any_alive(&self) -> bool {
        [&self.left, &self.right]
            .into_iter()
            .flatten()
            .any(|pane| pane.state() == PaneState::Running)
    }

    /// Apply a debounced terminal resize, if one is due. No panes, no work.
    fn process_pending_resize(&mut self, now: Instant) -> Result<(), SplitViewError> {
        if self.left.is_none() && self.right.is_none() {
            return Ok(());
        }
        if !self.debouncer.is_pending() || !self.debouncer.take_ready(now) {
            return Ok(());
        }
        match (self.size_source)() {
            Ok((width, height)) => {
                self.apply_terminal_size(width, height)?;
            }
            Err(e) => debug!("cannot read terminal size: {e}"),
        }
        Ok(())
    }

    /// Re-split for a new terminal size. A size below the minimum is ignored and
    /// the current layout kept. Returns whether the layout changed.
    pub fn apply_terminal_size(&mut self, width: u16, height: u16) -> Result<bool, SplitViewError> {
        match self.layout.calculate_split(width, height, self.ratio) {
            Ok((left, right)) => {
                self.apply_bounds(left, right);
                self.redraw()?;
                info!(width, height, split = left.width, "terminal resized");
                Ok(true)
            }
            Err(e) => {
                debug!("ignoring resize: {e}");
                Ok(false)
            }
        }
    }

    fn redraw(&mut self) -> Result<(), SplitViewError> {
        self.terminal.clear_screen()?;
        self.render_borders()
    }

    fn render_borders(&mut self) -> Result<(), SplitViewError> {
        let left = self.left.as_ref().map(Pane::bounds);
        let right = self.right.as_ref().map(Pane::bounds);
        self.terminal.hide_cursor()?;
        self.focus
            .render_indicators(&mut self.terminal, &self.border, |side| match side {
                PaneSide::Left => left,
                PaneSide::Right => right,
            })?;
        self.terminal.show_cursor()?;
        Ok(())
    }

    /// Terminate both panes and give the terminal back. Safe to call repeatedly.
    pub fn cleanup(&mut self) -> Result<(), SplitViewError> {
        self.set_state(SessionState::Cleanup);
        for pane in [self.left.as_mut(), self.right.as_mut()].into_iter().flatten() {
            pane.terminate();
        }
        let restored = self
            .terminal
            .exit_alternate_screen()
            .and_then(|()| self.terminal.show_cursor());
        self.set_state(SessionState::Exited);
        restored?;
        Ok(())
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "session state");
            self.state = state;
        }
    }
}

impl<W: Write> Drop for SplitViewManager<W> {
    fn drop(&mut self) {
        if !matches!(self.state, SessionState::Idle | SessionState::Exited) {
            let _ = self.cleanup();
        }
    }
}

/// Locate `command` the way a shell would: as given if it contains a slash,
/// otherwise in each `PATH` directory. Only executable files count.
pub fn find_in_path(command: &str) -> Option<PathBuf> {
    let command = command.trim();
    if command.is_empty() {
        return None;
    }
    if command.contains('/') {
        let path = PathBuf::from(command);
        return is_executable(&path).then_some(path);
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Message shown when the assistant is not installed.
pub fn fallback_notice(config: &SplitViewConfig) -> String {
    let delay = Duration::from_millis(config.assistant.startup_delay_ms);
    format!(
        "{command} was not found on your PATH.\n\
         \x20 Install it: {url}\n\
         \x20 To skip the split view permanently, run with {NO_SPLIT_FLAG} or set `enabled = false` in the config.\n\
         Starting the dashboard only in {secs:.1}s...",
        command = config.assistant.command,
        url = config.assistant.install_url,
        secs = delay.as_secs_f64(),
    )
}

/// Run the dashboard by itself with inherited stdio and return its exit code.
pub fn run_dashboard_only(config: &SplitViewConfig) -> Result<i32, SplitViewError> {
    let argv = config.dashboard_argv();
    let command_line = argv.join(" ");
    let Some((program, args)) = argv.split_first() else {
        return Err(SplitViewError::Dashboard {
            command: command_line,
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        });
    };
    info!(command = %command_line, "launching dashboard");
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|source| SplitViewError::Dashboard {
            command: command_line.clone(),
            source,
        })?;
    let code = status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0));
    debug!(code, "dashboard exited");
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::MIN_PANE_WIDTH;

    fn config() -> SplitViewConfig {
        SplitViewConfig {
            ratio: 0.4,
            ..SplitViewConfig::default()
        }
    }

    fn manager(config: SplitViewConfig) -> SplitViewManager<Vec<u8>> {
        SplitViewManager::new(config, TerminalController::new(Vec::new()))
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    fn screen(mgr: &SplitViewManager<Vec<u8>>) -> String {
        String::from_utf8_lossy(mgr.terminal().get_ref()).into_owned()
    }

    fn clear_screen_log(mgr: &mut SplitViewManager<Vec<u8>>) {
        mgr.terminal.get_mut().clear();
    }

    fn wait_dead(mgr: &mut SplitViewManager<Vec<u8>>, side: PaneSide) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if !mgr.pane_mut(side).unwrap().is_alive() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("{side:?} pane did not exit");
    }

    fn read_until(pane: &mut Pane, needle: &str) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = String::new();
        while Instant::now() < deadline && !seen.contains(needle) {
            seen.push_str(&String::from_utf8_lossy(&pane.read(4096)));
            std::thread::sleep(Duration::from_millis(10));
        }
        seen
    }

    #[test]
    fn panes_split_terminal() {
        let mut mgr = manager(config());
        mgr.create_panes(argv(&["cat"]), argv(&["cat"]), 120, 30).unwrap();

        assert_eq!(mgr.state(), SessionState::PanesCreated);
        let left = mgr.pane(PaneSide::Left).unwrap();
        let right = mgr.pane(PaneSide::Right).unwrap();
        assert_eq!(left.bounds(), PaneBounds::new(0, 0, 48, 30));
        assert_eq!(right.bounds(), PaneBounds::new(48, 0, 72, 30));
        assert_eq!(left.name(), "claude");
        assert_eq!(right.name(), "tui");
        assert_eq!(mgr.focus().panes(), &[PaneSide::Left, PaneSide::Right]);
        assert_eq!(mgr.focus().active(), Some(PaneSide::Left));
        assert!(screen(&mgr).contains("\x1b[2J"));
        mgr.cleanup().unwrap();
    }

    #[test]
    fn initial_focus_follows_config() {
        let mut mgr = manager(SplitViewConfig {
            active_pane: "tui".into(),
            ..config()
        });
        mgr.create_panes(argv(&["cat"]), argv(&["cat"]), 120, 30).unwrap();
        assert_eq!(mgr.focus().active(), Some(PaneSide::Right));
        mgr.cleanup().unwrap();

        let mut mgr = manager(SplitViewConfig {
            active_pane: "sideways".into(),
            ..config()
        });
        mgr.create_panes(argv(&["cat"]), argv(&["cat"]), 120, 30).unwrap();
        assert_eq!(mgr.focus().active(), Some(PaneSide::Left));
    }

    #[test]
    fn undersized_terminal_aborts_startup() {
        let mut mgr = manager(config());
        let err = mgr
            .create_panes(argv(&["cat"]), argv(&["cat"]), 50, 20)
            .unwrap_err();
        assert!(matches!(
            err,
            SplitViewError::Layout(LayoutError::TerminalTooSmall { .. })
        ));
        assert!(mgr.pane(PaneSide::Left).is_none());
        assert!(mgr.pane(PaneSide::Right).is_none());
    }

    #[test]
    fn failed_right_pane_leaves_left_for_cleanup() {
        let mut mgr = manager(config());
        let err = mgr
            .create_panes(
                argv(&["cat"]),
                argv(&["/nonexistent/splitview-dashboard"]),
                120,
                30,
            )
            .unwrap_err();
        assert!(matches!(err, SplitViewError::Pane(PaneError::Spawn { .. })));
        assert_eq!(
            mgr.pane(PaneSide::Left).unwrap().state(),
            PaneState::Running
        );
        mgr.cleanup().unwrap();
        assert_eq!(
            mgr.pane(PaneSide::Left).unwrap().state(),
            PaneState::Terminated
        );
    }

    #[test]
    fn shrink_shortcut_resizes_and_redraws() {
        let mut mgr = manager(config());
        mgr.create_panes(argv(&["cat"]), argv(&["cat"]), 120, 30).unwrap();
        clear_screen_log(&mut mgr);

        mgr.handle_input(b"\x02<").unwrap();

        let left = mgr.pane(PaneSide::Left).unwrap().bounds();
        let right = mgr.pane(PaneSide::Right).unwrap().bounds();
        assert_eq!(left.width, 48 - RESIZE_STEP as u16);
        assert_eq!(right.width, 72 + RESIZE_STEP as u16);
        assert_eq!(right.x, left.width);
        assert!(screen(&mgr).contains("\x1b[2J"));
        mgr.cleanup().unwrap();
    }

    #[test]
    fn grow_shortcut_stops_at_minimum_width() {
        let mut mgr = manager(config());
        mgr.create_panes(argv(&["cat"]), argv(&["cat"]), 120, 30).unwrap();
        for _ in 0..40 {
            mgr.handle_input(b"\x02>").unwrap();
        }
        let right = mgr.pane(PaneSide::Right).unwrap().bounds();
        assert_eq!(right.width, MIN_PANE_WIDTH);
        assert_eq!(mgr.pane(PaneSide::Left).unwrap().bounds().width, 120 - MIN_PANE_WIDTH);
        mgr.cleanup().unwrap();
    }

    #[test]
    fn plain_input_goes_to_focused_pane_only() {
        let mut mgr = manager(config());
        mgr.create_panes(argv(&["cat"]), argv(&["cat"]), 120, 30).unwrap();
        let before = (
            mgr.pane(PaneSide::Left).unwrap().bounds(),
            mgr.pane(PaneSide::Right).unwrap().bounds(),
        );
        clear_screen_log(&mut mgr);

        mgr.handle_input(b"a\n").unwrap();

        let after = (
            mgr.pane(PaneSide::Left).unwrap().bounds(),
            mgr.pane(PaneSide::Right).unwrap().bounds(),
        );
        assert_eq!(before, after);
        assert!(!screen(&mgr).contains("\x1b[2J"));

        let echoed = read_until(mgr.pane_mut(PaneSide::Left).unwrap(), "a");
        assert!(echoed.contains('a'));
        assert!(mgr.pane_mut(PaneSide::Right).unwrap().read(4096).is_empty());
        mgr.cleanup().unwrap();
    }

    #[test]
    fn switch_focus_redirects_input() {
        let mut mgr = manager(config());
        mgr.create_panes(argv(&["cat"]), argv(&["cat"]), 120, 30).unwrap();
        clear_screen_log(&mut mgr);

        mgr.handle_input(b"\x02\x1b[C").unwrap();
        assert_eq!(mgr.focus().active(), Some(PaneSide::Right));
        // Borders re-rendered without a full clear.
        let out = screen(&mgr);
        assert!(out.contains('┌'));
        assert!(!out.contains("\x1b[2J"));

        mgr.handle_input(b"z\n").unwrap();
        let echoed = read_until(mgr.pane_mut(PaneSide::Right).unwrap(), "z");
        assert!(echoed.contains('z'));

        mgr.handle_input(b"\x02\x1b[C").unwrap();
        assert_eq!(mgr.focus().active(), Some(PaneSide::Left));
        mgr.cleanup().unwrap();
    }

    #[test]
    fn both_panes_dead_ends_loop() {
        let mut mgr = manager(config());
        mgr.create_panes(argv(&["sh", "-c", "exit 0"]), argv(&["sh", "-c", "exit 0"]), 120, 30)
            .unwrap();
        wait_dead(&mut mgr, PaneSide::Left);
        wait_dead(&mut mgr, PaneSide::Right);

        let started = Instant::now();
        let code = mgr.event_loop(None, None).unwrap();
        assert_eq!(code, 0);
        assert!(started.elapsed() < Duration::from_millis(u64::from(POLL_TIMEOUT_MS)));
        assert_eq!(
            mgr.pane(PaneSide::Left).unwrap().state(),
            PaneState::Terminated
        );
    }

    #[test]
    fn loop_forwards_pane_output_to_screen() {
        let mut mgr = manager(config());
        mgr.create_panes(
            argv(&["sh", "-c", "echo left-side-output; sleep 0.3"]),
            argv(&["sh", "-c", "sleep 0.3"]),
            120,
            30,
        )
        .unwrap();

        assert_eq!(mgr.event_loop(None, None).unwrap(), 0);
        let out = screen(&mgr);
        assert!(out.contains("left-side-output"));
        // Left region margins: columns 1..=48.
        assert!(out.contains("\x1b[1;48s"));
    }

    #[cfg(target_os = "linux")]
    fn thread_cpu_time() -> Duration {
        use nix::sys::resource::{UsageWho, getrusage};
        use nix::sys::time::TimeVal;

        let usage = getrusage(UsageWho::RUSAGE_THREAD).unwrap();
        let to_duration =
            |tv: TimeVal| Duration::new(tv.tv_sec() as u64, tv.tv_usec() as u32 * 1000);
        to_duration(usage.user_time()) + to_duration(usage.system_time())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn detached_pane_does_not_busy_loop() {
        let mut mgr = manager(config());
        mgr.create_panes(
            argv(&["sh", "-c", "exec </dev/null >/dev/null 2>&1; sleep 1.5"]),
            argv(&["sh", "-c", "sleep 1.5"]),
            120,
            30,
        )
        .unwrap();

        let cpu_before = thread_cpu_time();
        let started = Instant::now();
        assert_eq!(mgr.event_loop(None, None).unwrap(), 0);
        assert!(started.elapsed() >= Duration::from_secs(1));
        let cpu = thread_cpu_time() - cpu_before;
        assert!(cpu < Duration::from_millis(300), "event loop used {cpu:?} of CPU");
    }

    #[test]
    fn paste_larger_than_pty_buffer_arrives_whole() {
        let dir = tempfile::tempdir().unwrap();
        let received = dir.path().join("received");
        let payload = format!("{}\n", "x".repeat(63)).repeat(4096);
        let script = format!(
            "sleep 0.3; timeout 20 head -c {} > '{}'",
            payload.len(),
            received.display()
        );

        let mut mgr = manager(config());
        mgr.create_panes(argv(&["sh", "-c", &script]), argv(&["sh", "-c", "sleep 0.3"]), 120, 30)
            .unwrap();
        mgr.handle_input(payload.as_bytes()).unwrap();
        assert!(mgr.pane(PaneSide::Left).unwrap().has_pending_input());

        assert_eq!(mgr.event_loop(None, None).unwrap(), 0);
        assert_eq!(std::fs::read_to_string(&received).unwrap(), payload);
    }

    #[test]
    fn resize_signal_relayouts_running_session() {
        let mut mgr = manager(config());
        mgr.size_source = || Ok((160, 40));
        mgr.create_panes(
            argv(&["sh", "-c", "sleep 0.5"]),
            argv(&["sh", "-c", "sleep 0.5"]),
            120,
            30,
        )
        .unwrap();

        let mut signal = ResizeSignal::install().unwrap();
        signal_hook::low_level::raise(signal_hook::consts::SIGWINCH).unwrap();
        assert_eq!(mgr.event_loop(None, Some(&mut signal)).unwrap(), 0);

        assert_eq!(
            mgr.pane(PaneSide::Left).unwrap().bounds(),
            PaneBounds::new(0, 0, 64, 40)
        );
        assert_eq!(
            mgr.pane(PaneSide::Right).unwrap().bounds(),
            PaneBounds::new(64, 0, 96, 40)
        );
        assert!(!mgr.debouncer.is_pending());
    }

    #[test]
    fn dead_pane_hands_focus_to_survivor() {
        let mut mgr = manager(config());
        mgr.create_panes(argv(&["sh", "-c", "exit 0"]), argv(&["cat"]), 120, 30)
            .unwrap();
        wait_dead(&mut mgr, PaneSide::Left);

        mgr.reap_dead_panes().unwrap();
        assert_eq!(
            mgr.pane(PaneSide::Left).unwrap().state(),
            PaneState::Terminated
        );
        assert_eq!(mgr.focus().panes(), &[PaneSide::Right]);
        assert_eq!(mgr.focus().active(), Some(PaneSide::Right));
        assert!(mgr.any_alive());

        // Toggling with one pane left is a no-op.
        mgr.handle_input(b"\x02\x1b[C").unwrap();
        assert_eq!(mgr.focus().active(), Some(PaneSide::Right));
        mgr.cleanup().unwrap();
    }

    #[test]
    fn undersized_resize_keeps_layout() {
        let mut mgr = manager(config());
        mgr.create_panes(argv(&["cat"]), argv(&["cat"]), 120, 30).unwrap();
        clear_screen_log(&mut mgr);

        assert!(!mgr.apply_terminal_size(50, 20).unwrap());
        assert_eq!(
            mgr.pane(PaneSide::Left).unwrap().bounds(),
            PaneBounds::new(0, 0, 48, 30)
        );
        assert!(mgr.terminal().get_ref().is_empty());

        assert!(mgr.apply_terminal_size(160, 40).unwrap());
        assert_eq!(
            mgr.pane(PaneSide::Left).unwrap().bounds(),
            PaneBounds::new(0, 0, 64, 40)
        );
        assert_eq!(
            mgr.pane(PaneSide::Right).unwrap().bounds(),
            PaneBounds::new(64, 0, 96, 40)
        );
        assert!(screen(&mgr).contains("\x1b[2J"));
        mgr.cleanup().unwrap();
    }

    #[test]
    fn resize_keeps_shortcut_adjusted_ratio() {
        let mut mgr = manager(SplitViewConfig {
            ratio: 0.5,
            ..config()
        });
        mgr.create_panes(argv(&["cat"]), argv(&["cat"]), 100, 30).unwrap();
        mgr.handle_input(b"\x02>").unwrap();
        assert_eq!(mgr.pane(PaneSide::Left).unwrap().bounds().width, 55);

        mgr.apply_terminal_size(200, 30).unwrap();
        assert_eq!(mgr.pane(PaneSide::Left).unwrap().bounds().width, 110);
        mgr.cleanup().unwrap();
    }

    #[test]
    fn cleanup_is_idempotent() {
        let mut mgr = manager(config());
        mgr.create_panes(argv(&["cat"]), argv(&["sh", "-c", "sleep 30"]), 120, 30)
            .unwrap();
        mgr.cleanup().unwrap();
        assert_eq!(mgr.state(), SessionState::Exited);
        assert!(!mgr.any_alive());
        mgr.cleanup().unwrap();
        assert_eq!(mgr.state(), SessionState::Exited);
    }

    #[test]
    fn non_interactive_launch_runs_dashboard_only() {
        let mut mgr = manager(SplitViewConfig {
            dashboard: crate::config::DashboardConfig {
                command: argv(&["sh", "-c", "exit 3"]),
            },
            ..config()
        });
        assert_eq!(mgr.launch(false).unwrap(), 3);
        assert_eq!(mgr.state(), SessionState::Exited);
        assert!(mgr.pane(PaneSide::Left).is_none());
        assert!(mgr.terminal().get_ref().is_empty());
    }

    #[test]
    fn missing_assistant_falls_back_with_zero_exit() {
        let mut config = config();
        config.assistant.command = "splitview-no-such-assistant".into();
        config.assistant.startup_delay_ms = 0;
        config.dashboard.command = argv(&["true"]);
        let mut mgr = manager(config);

        assert_eq!(mgr.launch(true).unwrap(), 0);
        assert!(mgr.pane(PaneSide::Left).is_none());
        assert!(mgr.pane(PaneSide::Right).is_none());
        assert!(!mgr.terminal().in_alternate_screen());
    }

    #[test]
    fn dashboard_launch_failure_is_an_error() {
        let mut config = config();
        config.dashboard.command = argv(&["/nonexistent/splitview-dashboard"]);
        let err = run_dashboard_only(&config).unwrap_err();
        assert!(matches!(err, SplitViewError::Dashboard { .. }));
        assert!(err.to_string().contains("--no-split"));
    }

    #[test]
    fn fallback_notice_names_program_url_and_flag() {
        let mut config = config();
        config.assistant.startup_delay_ms = 1500;
        let notice = fallback_notice(&config);
        assert!(notice.starts_with("claude was not found"));
        assert!(notice.contains(&config.assistant.install_url));
        assert!(notice.contains("--no-split"));
        assert!(notice.contains("1.5s"));
    }

    #[test]
    fn find_in_path_resolves_commands() {
        assert!(find_in_path("sh").is_some());
        assert!(find_in_path("splitview-no-such-command").is_none());
        assert!(find_in_path("").is_none());
        assert_eq!(find_in_path("/bin/sh"), Some(PathBuf::from("/bin/sh")));
        assert!(find_in_path("/nonexistent/sh").is_none());
    }

    #[test]
    fn find_in_path_skips_non_executables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, "not a program").unwrap();
        assert!(find_in_path(path.to_str().unwrap()).is_none());

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_in_path(path.to_str().unwrap()), Some(path));
    }
}
