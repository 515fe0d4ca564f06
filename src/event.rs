//! The event envelope delivered to the single-threaded runtime loop.
//!
//! Three sources feed one `mpsc` channel instead of raw OS signals: the
//! timer manager's worker threads, the variable server's subscription
//! delivery, and a signal-bridge thread translating `SIGINT`/`SIGTERM`
//! into `Event::Terminate`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Timer `id` (1..=254) has fired.
    TimerFired { id: u8 },
    /// The variable behind this handle was modified.
    VariableModified { handle: u32 },
    /// `SIGINT` or `SIGTERM` was received; shut down gracefully.
    Terminate,
}

/// What kind of event this is, independent of its payload — used by the
/// guard matcher, which only needs (kind, id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Timer,
    Variable,
}

impl Event {
    /// Splits the event into `(kind, id)` for guard matching. Returns
    /// `None` for `Terminate`, which no guard can reference.
    pub fn as_kind_id(&self) -> Option<(EventKind, u32)> {
        match *self {
            Event::TimerFired { id } => Some((EventKind::Timer, id as u32)),
            Event::VariableModified { handle } => Some((EventKind::Variable, handle)),
            Event::Terminate => None,
        }
    }
}
