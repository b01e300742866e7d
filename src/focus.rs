use std::io::{self, Write};

use tracing::warn;

use crate::config::ColorsConfig;
use crate::layout::PaneBounds;
use crate::terminal::TerminalController;

/// Which half of the screen a pane occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneSide {
    Left,
    Right,
}

impl PaneSide {
    /// Resolve the configured `active_pane` name. The dashboard is "tui"; the
    /// assistant ("claude") and the shell both live on the left, as does anything
    /// unrecognized.
    pub fn from_config(name: &str) -> Self {
        match name.trim() {
            "tui" => PaneSide::Right,
            _ => PaneSide::Left,
        }
    }

    pub fn other(self) -> Self {
        match self {
            PaneSide::Left => PaneSide::Right,
            PaneSide::Right => PaneSide::Left,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorderStyle {
    pub active: String,
    pub inactive: String,
}

impl BorderStyle {
    pub fn from_config(colors: &ColorsConfig) -> Self {
        Self {
            active: colors.active.clone(),
            inactive: colors.inactive.clone(),
        }
    }
}

/// Tracks which of the live panes receives keyboard input.
#[derive(Debug, Default)]
pub struct FocusManager {
    panes: Vec<PaneSide>,
    active: Option<PaneSide>,
}

impl FocusManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, side: PaneSide) {
        if !self.panes.contains(&side) {
            self.panes.push(side);
        }
    }

    pub fn unregister(&mut self, side: PaneSide) {
        self.panes.retain(|p| *p != side);
    }

    pub fn panes(&self) -> &[PaneSide] {
        &self.panes
    }

    pub fn active(&self) -> Option<PaneSide> {
        self.active
    }

    pub fn set_active(&mut self, side: Option<PaneSide>) {
        self.active = side;
    }

    /// True when the active reference is either unset or one of the registered panes.
    pub fn is_consistent(&self) -> bool {
        match self.active {
            Some(side) => self.panes.contains(&side),
            None => true,
        }
    }

    /// Switch focus to the other pane. Does nothing unless exactly two panes are
    /// registered; an active reference outside the set falls back to the first pane.
    pub fn toggle(&mut self) {
        if self.panes.len() != 2 {
            return;
        }
        let next = match self.active {
            Some(side) if self.panes.contains(&side) => side.other(),
            other => {
                warn!(active = ?other, panes = ?self.panes, "focus reference outside pane set, resetting to first pane");
                self.panes[0]
            }
        };
        self.active = Some(next);
    }

    /// Draw each registered pane's border: active color for the focused pane,
    /// inactive for the rest. Panes without bounds are skipped.
    pub fn render_indicators<W: Write>(
        &self,
        terminal: &mut TerminalController<W>,
        style: &BorderStyle,
        bounds: impl Fn(PaneSide) -> Option<PaneBounds>,
    ) -> io::Result<()> {
        for &side in &self.panes {
            let Some(area) = bounds(side) else {
                continue;
            };
            let color = if Some(side) == self.active {
                &style.active
            } else {
                &style.inactive
            };
            terminal.draw_border(area, color)?;
        }
        terminal.flush()
    }
}
