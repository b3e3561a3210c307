//! Failure classification for received units and connection events.
//!
//! Every failure surfaced to the handler carries exactly one [`FailReason`].
//! Classification happens at the point of detection; a reason is never
//! derived from another reason.

use crate::types::Cot;

/// Closed set of reasons a received unit or connection event failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailReason {
    /// The outstation misbehaved (unexpected data, refused procedure)
    RtuSide,
    /// Information object address outside the configured range
    BadIoa,
    /// Common address not in the configured station set
    BadCoa,
    /// Transport-level failure or disconnect
    Network,
    /// Negative confirmation bit set by the outstation
    NegativeBit,
    /// Quality descriptor marks the value unusable
    BadQuality,
    /// Two control procedures outstanding for the same sequence window
    Collision,
    /// Interrogation termination missing or mismatched
    InterroUnfinished,
    /// Frame or ASDU type the engine does not support
    TypeUnsupported,
    /// Internal engine error
    ServerError,
    /// Sequence-number desynchronization detected on a received frame.
    ///
    /// Deliberately distinct from [`FailReason::Network`]: desync means the
    /// transport delivered frames intact but the counters no longer agree,
    /// which only a fresh handshake can repair.
    SeqDesync,
}

impl FailReason {
    /// Classify a negative cause of transmission reported by the outstation.
    ///
    /// Returns `None` for causes that are not negative confirmations.
    pub fn from_negative_cot(cot: Cot) -> Option<Self> {
        match cot {
            Cot::UnknownTypeId => Some(Self::TypeUnsupported),
            Cot::UnknownCot => Some(Self::RtuSide),
            Cot::UnknownCoa => Some(Self::BadCoa),
            Cot::UnknownIoa => Some(Self::BadIoa),
            _ => None,
        }
    }

    /// Whether a failure with this reason warrants a reconnect rather than a retry.
    pub fn needs_reconnect(&self) -> bool {
        matches!(self, Self::Network | Self::SeqDesync)
    }
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RtuSide => "RTU_SIDE",
            Self::BadIoa => "BAD_IOA",
            Self::BadCoa => "BAD_COA",
            Self::Network => "NETWORK",
            Self::NegativeBit => "NEGATIVE_BIT",
            Self::BadQuality => "BAD_QUALITY",
            Self::Collision => "COLLISION",
            Self::InterroUnfinished => "INTERRO_UNFINISHED",
            Self::TypeUnsupported => "TYPE_UNSUPPORTED",
            Self::ServerError => "SERVER_ERROR",
            Self::SeqDesync => "SEQ_DESYNC",
        };
        write!(f, "{}", name)
    }
}

/// A classified failure event, delivered through the handler path alongside
/// successful decodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// The single reason attached to this event
    pub reason: FailReason,
    /// Human-readable detail for logging
    pub message: String,
}

impl Failure {
    /// Create a new failure with the given reason and detail.
    pub fn new(reason: FailReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}
