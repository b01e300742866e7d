use std::io::{self, Write};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::queue;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};

use crate::layout::PaneBounds;

/// DECLRMM on/off: lets DECSLRM restrict output to a column range.
const ENABLE_LR_MARGINS: &str = "\x1b[?69h";
const DISABLE_LR_MARGINS: &str = "\x1b[?69l";
/// DECSTBM with no arguments: scroll region back to the full screen.
const RESET_SCROLL_REGION: &str = "\x1b[r";
/// DECOM on/off: cursor addressing relative to the margins.
const ENABLE_ORIGIN_MODE: &str = "\x1b[?6h";
const DISABLE_ORIGIN_MODE: &str = "\x1b[?6l";

/// Owns the controlling terminal's screen: alternate buffer, cursor, borders and
/// the per-pane output regions. Generic over the sink so tests can capture output.
pub struct TerminalController<W: Write> {
    out: W,
    /// Raw mode is only toggled when the sink is the real terminal.
    controls_tty: bool,
    in_alternate_screen: bool,
    raw_mode: bool,
    region: Option<PaneBounds>,
}

impl TerminalController<io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            controls_tty: true,
            ..Self::new(io::stdout())
        }
    }
}

impl<W: Write> TerminalController<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            controls_tty: false,
            in_alternate_screen: false,
            raw_mode: false,
            region: None,
        }
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    #[cfg(test)]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out
    }

    #[cfg(test)]
    pub fn in_alternate_screen(&self) -> bool {
        self.in_alternate_screen
    }

    pub fn enter_alternate_screen(&mut self) -> io::Result<()> {
        if self.in_alternate_screen {
            return Ok(());
        }
        if self.controls_tty {
            crossterm::terminal::enable_raw_mode()?;
            self.raw_mode = true;
        }
        queue!(self.out, EnterAlternateScreen)?;
        self.in_alternate_screen = true;
        self.out.flush()
    }

    /// Leave the alternate screen and restore cooked mode. Safe to call repeatedly.
    pub fn exit_alternate_screen(&mut self) -> io::Result<()> {
        if self.in_alternate_screen {
            self.reset_region()?;
            queue!(self.out, ResetColor, LeaveAlternateScreen)?;
            self.in_alternate_screen = false;
        }
        let flushed = self.out.flush();
        if self.raw_mode {
            self.raw_mode = false;
            crossterm::terminal::disable_raw_mode()?;
        }
        flushed
    }

    pub fn clear_screen(&mut self) -> io::Result<()> {
        self.reset_region()?;
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))
    }

    pub fn move_cursor(&mut self, row: u16, col: u16) -> io::Result<()> {
        queue!(self.out, MoveTo(col, row))
    }

    pub fn show_cursor(&mut self) -> io::Result<()> {
        queue!(self.out, Show)?;
        self.out.flush()
    }

    pub fn hide_cursor(&mut self) -> io::Result<()> {
        queue!(self.out, Hide)?;
        self.out.flush()
    }

    /// Set the foreground color by name. Unknown names emit nothing.
    pub fn set_color(&mut self, name: &str) -> io::Result<()> {
        match parse_color(name) {
            Some(color) => queue!(self.out, SetForegroundColor(color)),
            None => Ok(()),
        }
    }

    pub fn reset_color(&mut self) -> io::Result<()> {
        queue!(self.out, ResetColor)
    }

    /// Draw a box along the edges of `bounds` in the named color.
    ///
    /// The box overlays the outermost cells of the region. Unknown color names and
    /// regions too small to hold a box draw nothing.
    pub fn draw_border(&mut self, bounds: PaneBounds, color: &str) -> io::Result<()> {
        if parse_color(color).is_none() || bounds.width < 2 || bounds.height < 2 {
            return Ok(());
        }
        self.reset_region()?;

        let left = bounds.x;
        let right = bounds.x + bounds.width - 1;
        let top = bounds.y;
        let bottom = bounds.y + bounds.height - 1;
        let horizontal = "─".repeat(usize::from(bounds.width - 2));

        self.set_color(color)?;
        self.move_cursor(top, left)?;
        queue!(self.out, Print("┌"), Print(&horizontal), Print("┐"))?;
        for row in top + 1..bottom {
            self.move_cursor(row, left)?;
            queue!(self.out, Print("│"))?;
            self.move_cursor(row, right)?;
            queue!(self.out, Print("│"))?;
        }
        self.move_cursor(bottom, left)?;
        queue!(self.out, Print("└"), Print(&horizontal), Print("┘"))?;
        self.reset_color()
    }

    /// Write a pane's output verbatim inside its region.
    ///
    /// Scroll region and left/right margins are re-targeted only when the output
    /// source changes; the cursor then starts at the region's top-left cell. Origin
    /// mode keeps the child's absolute cursor moves inside the region.
    pub fn write_region(&mut self, bounds: PaneBounds, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.region != Some(bounds) && bounds.width > 0 && bounds.height > 0 {
            let top = bounds.y + 1;
            let bottom = bounds.y + bounds.height;
            let left = bounds.x + 1;
            let right = bounds.x + bounds.width;
            write!(
                self.out,
                "{ENABLE_LR_MARGINS}\x1b[{top};{bottom}r\x1b[{left};{right}s{ENABLE_ORIGIN_MODE}"
            )?;
            // Relative to the margins now: the region's top-left cell.
            queue!(self.out, MoveTo(0, 0))?;
            self.region = Some(bounds);
        }
        self.out.write_all(bytes)?;
        self.out.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn reset_region(&mut self) -> io::Result<()> {
        if self.region.take().is_some() {
            write!(
                self.out,
                "{DISABLE_ORIGIN_MODE}{RESET_SCROLL_REGION}{DISABLE_LR_MARGINS}"
            )?;
        }
        Ok(())
    }
}

/// Best-effort terminal restore on stdout, for the panic hook.
pub fn restore_stdout() {
    let mut out = io::stdout();
    let _ = write!(
        out,
        "{DISABLE_ORIGIN_MODE}{RESET_SCROLL_REGION}{DISABLE_LR_MARGINS}"
    );
    let _ = queue!(out, ResetColor, Show, LeaveAlternateScreen);
    let _ = out.flush();
    let _ = crossterm::terminal::disable_raw_mode();
}

/// Map a color name from the config to a terminal color.
pub fn parse_color(name: &str) -> Option<Color> {
    let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
    let color = match normalized.as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "dark_red" => Color::DarkRed,
        "green" => Color::Green,
        "dark_green" => Color::DarkGreen,
        "yellow" => Color::Yellow,
        "dark_yellow" => Color::DarkYellow,
        "blue" => Color::Blue,
        "dark_blue" => Color::DarkBlue,
        "magenta" => Color::Magenta,
        "dark_magenta" => Color::DarkMagenta,
        "cyan" => Color::Cyan,
        "dark_cyan" => Color::DarkCyan,
        "white" => Color::White,
        "grey" | "gray" => Color::Grey,
        "dark_grey" | "dark_gray" => Color::DarkGrey,
        _ => return None,
    };
    Some(color)
}
