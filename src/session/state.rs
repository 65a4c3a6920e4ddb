//! Relay session state machine
//!
//! Tracks where a client session is in its lifecycle. Transitions are only
//! taken from the expected predecessor, so an out-of-order call is a no-op.
//!
//! ```text
//! Connecting ──► RequestSent ──► AwaitingGreeting ──► Relaying ──► Finished
//!      └──────────────┴────────────────┴───────────────┴──► Failed
//! ```

/// Client-side relay session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Opening the TCP connection
    Connecting,
    /// Request written
    RequestSent,
    /// Waiting for the `ICY` greeting
    AwaitingGreeting,
    /// Greeting accepted, copying data into the sink
    Relaying,
    /// Upstream closed the stream or a shutdown was requested
    Finished,
    /// Any error
    Failed,
}

/// State of a client relay session
#[derive(Debug)]
pub struct SessionState {
    /// Current phase
    pub phase: SessionPhase,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Connecting,
        }
    }

    pub fn request_sent(&mut self) {
        if self.phase == SessionPhase::Connecting {
            self.phase = SessionPhase::RequestSent;
        }
    }

    pub fn await_greeting(&mut self) {
        if self.phase == SessionPhase::RequestSent {
            self.phase = SessionPhase::AwaitingGreeting;
        }
    }

    pub fn start_relaying(&mut self) {
        if self.phase == SessionPhase::AwaitingGreeting {
            self.phase = SessionPhase::Relaying;
        }
    }

    pub fn finish(&mut self) {
        if self.phase == SessionPhase::Relaying {
            self.phase = SessionPhase::Finished;
        }
    }

    /// Enter the failed state from any non-terminal phase
    pub fn fail(&mut self) {
        if !self.is_terminal() {
            self.phase = SessionPhase::Failed;
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, SessionPhase::Finished | SessionPhase::Failed)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
