use crate::config::ShortcutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    SwitchFocus,
    ShrinkLeft,
    GrowLeft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Bytes for the focused pane, untouched.
    Forward(Vec<u8>),
    Shortcut(ShortcutAction),
}

/// Splits the controlling terminal's byte stream into shortcuts and pass-through
/// input. A shortcut cut in half by a read boundary is held until the next read.
#[derive(Debug)]
pub struct ShortcutParser {
    bindings: Vec<(Vec<u8>, ShortcutAction)>,
    pending: Vec<u8>,
}

impl ShortcutParser {
    pub fn new(config: &ShortcutConfig) -> Self {
        let sequence = |marker: &str| {
            let mut seq = config.prefix.as_bytes().to_vec();
            seq.extend_from_slice(marker.as_bytes());
            seq
        };
        Self {
            bindings: vec![
                (sequence(&config.switch_focus), ShortcutAction::SwitchFocus),
                (sequence(&config.shrink_left), ShortcutAction::ShrinkLeft),
                (sequence(&config.grow_left), ShortcutAction::GrowLeft),
            ],
            pending: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Release held prefix bytes, e.g. when the input stream closes.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn feed(&mut self, input: &[u8]) -> Vec<InputEvent> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(input);

        let mut events = Vec::new();
        let mut start = 0;
        let mut i = 0;

        'scan: while i < buf.len() {
            let rest = &buf[i..];
            for (seq, action) in &self.bindings {
                if rest.starts_with(seq) {
                    push_forward(&mut events, &buf[start..i]);
                    events.push(InputEvent::Shortcut(*action));
                    i += seq.len();
                    start = i;
                    continue 'scan;
                }
            }
            if self
                .bindings
                .iter()
                .any(|(seq, _)| rest.len() < seq.len() && seq.starts_with(rest))
            {
                push_forward(&mut events, &buf[start..i]);
                self.pending = rest.to_vec();
                return events;
            }
            i += 1;
        }

        push_forward(&mut events, &buf[start..]);
        events
    }
}

fn push_forward(events: &mut Vec<InputEvent>, bytes: &[u8]) {
    if !bytes.is_empty() {
        events.push(InputEvent::Forward(bytes.to_vec()));
    }
}
