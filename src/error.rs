//! Error types for the IEC 60870-5-104 link engine.

use thiserror::Error;

use crate::classify::FailReason;

/// Result type alias for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// IEC 60870-5-104 link engine error types.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Not connected to remote
    #[error("Not connected")]
    NotConnected,

    /// Connection timeout
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid frame format
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Invalid ASDU
    #[error("Invalid ASDU: {0}")]
    InvalidAsdu(String),

    /// Unknown type identifier
    #[error("Unknown type ID: {0}")]
    UnknownTypeId(u8),

    /// Information object address outside the configured range
    #[error("IOA {0} outside configured range")]
    BadIoa(u32),

    /// Common address not in the configured station set
    #[error("Unknown common address: {0}")]
    BadCoa(u16),

    /// Sequence number exceeds the 15-bit range
    #[error("Sequence number {0} exceeds 15-bit range")]
    SequenceOutOfRange(u16),

    /// Received send-sequence number does not match the expected counter
    #[error("Sequence desync: expected {expected}, got {actual}")]
    SequenceDesync { expected: u16, actual: u16 },

    /// A control procedure is already outstanding for this link
    #[error("Procedure collision: {0}")]
    Collision(&'static str),

    /// Operation not permitted in the current connection state
    #[error("Invalid state for operation: {0}")]
    InvalidState(&'static str),

    /// T1 timeout (send confirmation)
    #[error("T1 timeout: no confirmation received")]
    T1Timeout,

    /// Too many unconfirmed frames
    #[error("Too many unconfirmed frames (k={0})")]
    TooManyUnconfirmed(u16),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// Codec error
    #[error("Codec error: {0}")]
    Codec(String),
}

impl LinkError {
    /// Create a protocol error with a message.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create an invalid frame error.
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Create an invalid ASDU error.
    pub fn invalid_asdu(msg: impl Into<String>) -> Self {
        Self::InvalidAsdu(msg.into())
    }

    /// Check if this error indicates a connection problem.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::NotConnected | Self::ConnectionTimeout | Self::Io(_)
        )
    }

    /// Map this error to the failure classification reported upstream.
    ///
    /// Pure mapping, evaluated at the point of detection. Each error maps to
    /// exactly one [`FailReason`].
    pub fn classify(&self) -> FailReason {
        match self {
            Self::InvalidFrame(_)
            | Self::InvalidAsdu(_)
            | Self::UnknownTypeId(_)
            | Self::SequenceOutOfRange(_)
            | Self::Codec(_) => FailReason::TypeUnsupported,
            Self::BadIoa(_) => FailReason::BadIoa,
            Self::BadCoa(_) => FailReason::BadCoa,
            Self::SequenceDesync { .. } => FailReason::SeqDesync,
            Self::Collision(_) => FailReason::Collision,
            Self::InvalidState(_) => FailReason::ServerError,
            Self::Connection(_)
            | Self::NotConnected
            | Self::ConnectionTimeout
            | Self::Io(_)
            | Self::ChannelClosed => FailReason::Network,
            Self::Protocol(_) | Self::T1Timeout | Self::TooManyUnconfirmed(_) => {
                FailReason::RtuSide
            }
        }
    }
}
