use portable_pty::PtySize;

/// Smallest terminal the split view will start in (and accept on resize).
pub const MIN_TERMINAL_WIDTH: u16 = 80;
pub const MIN_TERMINAL_HEIGHT: u16 = 24;

/// Neither pane is ever narrower than this after a shortcut resize.
pub const MIN_PANE_WIDTH: u16 = 20;

pub const MIN_RATIO: f64 = 0.1;
pub const MAX_RATIO: f64 = 0.9;

/// A rectangular screen region, 0-indexed from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaneBounds {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl PaneBounds {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Window size handed to the pseudo-terminal of the pane occupying these bounds.
    pub fn pty_size(&self) -> PtySize {
        PtySize {
            rows: self.height,
            cols: self.width,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("split ratio must be within [{min}, {max}], got {ratio}")]
    InvalidRatio { ratio: f64, min: f64, max: f64 },
    #[error("terminal dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u16, height: u16 },
    #[error("terminal too small: need at least {min_width}x{min_height}, got {width}x{height}")]
    TerminalTooSmall {
        min_width: u16,
        min_height: u16,
        width: u16,
        height: u16,
    },
}

/// Split-screen arithmetic. Holds no pane state: every call returns fresh bounds.
#[derive(Debug, Clone)]
pub struct LayoutManager {
    min_width: u16,
    min_height: u16,
}

impl Default for LayoutManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutManager {
    pub fn new() -> Self {
        Self {
            min_width: MIN_TERMINAL_WIDTH,
            min_height: MIN_TERMINAL_HEIGHT,
        }
    }

    /// Split the terminal vertically into a left and a right pane.
    ///
    /// The left pane gets `floor(width * ratio)` columns and the right pane the rest,
    /// so the two widths always add up to `width`. Both panes span the full height.
    pub fn calculate_split(
        &self,
        width: u16,
        height: u16,
        ratio: f64,
    ) -> Result<(PaneBounds, PaneBounds), LayoutError> {
        if !(MIN_RATIO..=MAX_RATIO).contains(&ratio) {
            return Err(LayoutError::InvalidRatio {
                ratio,
                min: MIN_RATIO,
                max: MAX_RATIO,
            });
        }
        if width == 0 || height == 0 {
            return Err(LayoutError::InvalidDimensions { width, height });
        }
        self.check_size(width, height)?;

        let split_col = (f64::from(width) * ratio).floor() as u16;
        let left = PaneBounds::new(0, 0, split_col, height);
        let right = PaneBounds::new(split_col, 0, width - split_col, height);
        Ok((left, right))
    }

    /// Move the boundary between the panes by `delta` columns.
    ///
    /// Positive `delta` grows the left pane. Widths are clamped to [`MIN_PANE_WIDTH`];
    /// when the total is too narrow to give both panes the minimum, it is shared evenly.
    pub fn resize_pane(
        &self,
        left: PaneBounds,
        right: PaneBounds,
        delta: i32,
    ) -> (PaneBounds, PaneBounds) {
        let total = i32::from(left.width) + i32::from(right.width);
        let min = i32::from(MIN_PANE_WIDTH);

        let left_width = if total < min * 2 {
            total / 2
        } else {
            (i32::from(left.width) + delta).clamp(min, total - min)
        };
        let right_width = total - left_width;

        let new_left = PaneBounds {
            width: left_width as u16,
            ..left
        };
        let new_right = PaneBounds {
            x: left.x + left_width as u16,
            width: right_width as u16,
            ..right
        };
        (new_left, new_right)
    }

    /// Check the current terminal size against the minimum. Never fails: a terminal
    /// whose size cannot be read counts as too small.
    pub fn validate_minimum_size(&self) -> bool {
        match crossterm::terminal::size() {
            Ok((width, height)) => self.check_size(width, height).is_ok(),
            Err(_) => false,
        }
    }

    pub fn check_size(&self, width: u16, height: u16) -> Result<(), LayoutError> {
        if width < self.min_width || height < self.min_height {
            return Err(LayoutError::TerminalTooSmall {
                min_width: self.min_width,
                min_height: self.min_height,
                width,
                height,
            });
        }
        Ok(())
    }
}
