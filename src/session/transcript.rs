/// Reconciles interim and final transcript fragments into one growing text
/// stream.
///
/// Final fragments are committed permanently, space-joined onto prior text.
/// Interim fragments replace each other wholesale and are never merged into
/// the committed text; a final that supersedes an interim clears it, so the
/// fragment is counted exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    /// Accepted text; append-only between clears
    committed: String,

    /// Latest provisional fragment, replaced on every interim event
    interim: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one transcript fragment.
    ///
    /// Empty and whitespace-only fragments carry no information and are
    /// ignored. Returns whether the buffer changed.
    pub fn apply(&mut self, text: &str, is_final: bool) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        if is_final {
            if self.committed.is_empty() {
                self.committed = text.to_string();
            } else {
                self.committed.push(' ');
                self.committed.push_str(text);
            }
            self.interim.clear();
        } else {
            self.interim = text.to_string();
        }

        true
    }

    /// The text a consumer should display right now:
    /// committed text, then the provisional fragment, space-joined.
    pub fn display(&self) -> String {
        if self.interim.is_empty() {
            self.committed.clone()
        } else if self.committed.is_empty() {
            self.interim.clone()
        } else {
            format!("{} {}", self.committed, self.interim)
        }
    }

    pub fn committed(&self) -> &str {
        &self.committed
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.interim.is_empty()
    }

    /// Drop the provisional fragment. Used on connection teardown so a
    /// half-spoken phrase does not linger in the display.
    pub fn clear_interim(&mut self) {
        self.interim.clear();
    }

    /// Reset both parts to empty.
    pub fn clear(&mut self) {
        self.committed.clear();
        self.interim.clear();
    }
}
