//! One-shot warning flags.

/// Remembers whether a recoverable condition has already been reported.
///
/// Conditions such as a full empirical table can fire once per token; only
/// the first occurrence is worth a log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarnOnce {
    fired: bool,
}

impl WarnOnce {
    pub const fn new() -> Self {
        Self { fired: false }
    }

    /// Returns `true` the first time it is called, `false` afterwards.
    #[inline]
    pub fn first(&mut self) -> bool {
        !std::mem::replace(&mut self.fired, true)
    }

    /// Whether the warning has been emitted.
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Arm the flag again, e.g. when a new document starts.
    pub fn reset(&mut self) {
        self.fired = false;
    }
}
