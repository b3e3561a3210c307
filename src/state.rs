//! Connection state machine.
//!
//! Per-link state driven by U-format control confirms, interrogation
//! progress, and external transport events. Transitions are pure functions
//! of (state, event); the machine holds no locks and must be owned by a
//! single execution context.

/// Connection state of one logical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport attempt has been made yet (initial state)
    Unattempted,
    /// Handshake failed, was refused, or the link was torn down
    Closed,
    /// Data transfer active (STARTDT confirmed)
    Open,
    /// General interrogation sent, termination outstanding
    InterroStarted,
    /// Interrogation terminated, full image received
    InterroDone,
    /// Unrecoverable desynchronization; only a fresh handshake helps
    Unknown,
}

/// Events driving the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A new transport handshake was initiated (re-entry from Closed)
    HandshakeStarted,
    /// Transport handshake succeeded and STARTDT was confirmed
    StartDtConfirmed,
    /// Transport handshake failed or was refused
    HandshakeFailed,
    /// A general-interrogation command was sent (cause: activation)
    InterrogationSent,
    /// The matching interrogation-termination ASDU arrived
    InterrogationTerminated,
    /// The outstanding interrogation timed out without termination
    InterrogationTimeout,
    /// STOPDT confirm received
    StopDtConfirmed,
    /// Transport-level disconnect
    TransportLost,
    /// Received sequence number does not match the expected counter
    SequenceDesync,
}

impl ConnectionState {
    /// Apply one event, returning the next state.
    ///
    /// Total and deterministic: unmodeled (state, event) pairs leave the
    /// state unchanged, which makes repeated confirms idempotent.
    pub fn apply(self, event: LinkEvent) -> ConnectionState {
        use ConnectionState::*;
        use LinkEvent::*;

        match (self, event) {
            (_, SequenceDesync) => Unknown,

            // Recovery from desync is also a fresh handshake
            (Closed | Unknown, HandshakeStarted) => Unattempted,

            (Unattempted, StartDtConfirmed) => Open,
            (Unattempted | Closed, HandshakeFailed) => Closed,

            (Open | InterroDone, InterrogationSent) => InterroStarted,
            (InterroStarted, InterrogationTerminated) => InterroDone,
            (InterroStarted, InterrogationTimeout) => Unknown,

            (Open | InterroStarted | InterroDone, StopDtConfirmed | TransportLost) => Closed,

            (state, _) => state,
        }
    }

    /// Whether data APDUs may be sent or accepted in this state.
    #[inline]
    pub const fn can_transfer(&self) -> bool {
        matches!(self, Self::Open | Self::InterroStarted | Self::InterroDone)
    }

    /// Whether the link needs a fresh handshake before anything else.
    #[inline]
    pub const fn needs_handshake(&self) -> bool {
        matches!(self, Self::Unattempted | Self::Closed | Self::Unknown)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unattempted => "UNATTEMPTED",
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::InterroStarted => "INTERRO_STARTED",
            Self::InterroDone => "INTERRO_DONE",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{}", name)
    }
}
