use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use signal_hook::consts::SIGWINCH;
use signal_hook::SigId;

/// Minimum spacing between two processed terminal resizes.
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(100);

/// Window-size-change notifications turned into readable bytes (self-pipe).
///
/// The signal handler only writes a byte to a socket; the event loop polls the
/// other end and does all layout work on its own thread.
pub struct ResizeSignal {
    reader: UnixStream,
    id: SigId,
}

impl ResizeSignal {
    pub fn install() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        let id = signal_hook::low_level::pipe::register(SIGWINCH, writer)?;
        Ok(Self { reader, id })
    }

    /// Consume every queued notification. Returns whether there was at least one.
    pub fn drain(&mut self) -> bool {
        let mut buf = [0u8; 64];
        let mut seen = false;
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return seen,
                Ok(_) => seen = true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return seen,
            }
        }
    }
}

impl AsFd for ResizeSignal {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}

impl Drop for ResizeSignal {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
    }
}

/// Collapses bursts of resize notifications (window drags) into at most one
/// layout recompute per interval. A notification that arrives too early stays
/// pending and is picked up once the interval has passed.
#[derive(Debug)]
pub struct ResizeDebouncer {
    interval: Duration,
    last_processed: Option<Instant>,
    pending: bool,
}

impl Default for ResizeDebouncer {
    fn default() -> Self {
        Self::new(RESIZE_DEBOUNCE)
    }
}

impl ResizeDebouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_processed: None,
            pending: false,
        }
    }

    pub fn notify(&mut self) {
        self.pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// True if a pending resize should be processed now; marks it processed.
    pub fn take_ready(&mut self, now: Instant) -> bool {
        if !self.pending {
            return false;
        }
        let due = match self.last_processed {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        };
        if due {
            self.pending = false;
            self.last_processed = Some(now);
        }
        due
    }
}
