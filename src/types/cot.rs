//! Cause of transmission (COT).

use crate::error::{LinkError, Result};

/// Cause of Transmission.
///
/// The lower 6 bits of the third ASDU header byte; the reason an ASDU was
/// sent. Interrogation and counter-request responses carry a group index
/// rather than getting one variant each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cot {
    /// Periodic, cyclic (1)
    Periodic,
    /// Background scan (2)
    Background,
    /// Spontaneous (3)
    Spontaneous,
    /// Initialized (4)
    Initialized,
    /// Request or requested (5)
    Request,
    /// Activation (6)
    Activation,
    /// Activation confirmation (7)
    ActivationConfirm,
    /// Deactivation (8)
    Deactivation,
    /// Deactivation confirmation (9)
    DeactivationConfirm,
    /// Activation termination (10)
    ActivationTermination,
    /// Return information caused by a remote command (11)
    ReturnRemoteCommand,
    /// Return information caused by a local command (12)
    ReturnLocalCommand,
    /// Interrogation response: group 0 is station interrogation,
    /// groups 1-16 the partial interrogations (20-36)
    InterrogatedBy(u8),
    /// Counter request response: group 0 is the general request,
    /// groups 1-4 the partial requests (37-41)
    RequestedByCounter(u8),
    /// Unknown type identification (44)
    UnknownTypeId,
    /// Unknown cause of transmission (45)
    UnknownCot,
    /// Unknown common address of ASDU (46)
    UnknownCoa,
    /// Unknown information object address (47)
    UnknownIoa,
}

impl Cot {
    /// Parse COT from the raw byte (lower 6 bits; test/negative flags in the
    /// upper bits are the header parser's concern).
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value & 0x3F {
            1 => Ok(Self::Periodic),
            2 => Ok(Self::Background),
            3 => Ok(Self::Spontaneous),
            4 => Ok(Self::Initialized),
            5 => Ok(Self::Request),
            6 => Ok(Self::Activation),
            7 => Ok(Self::ActivationConfirm),
            8 => Ok(Self::Deactivation),
            9 => Ok(Self::DeactivationConfirm),
            10 => Ok(Self::ActivationTermination),
            11 => Ok(Self::ReturnRemoteCommand),
            12 => Ok(Self::ReturnLocalCommand),
            v @ 20..=36 => Ok(Self::InterrogatedBy(v - 20)),
            v @ 37..=41 => Ok(Self::RequestedByCounter(v - 37)),
            44 => Ok(Self::UnknownTypeId),
            45 => Ok(Self::UnknownCot),
            46 => Ok(Self::UnknownCoa),
            47 => Ok(Self::UnknownIoa),
            v => Err(LinkError::protocol(format!("Unknown COT: {}", v))),
        }
    }

    /// Convert to the raw byte value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Periodic => 1,
            Self::Background => 2,
            Self::Spontaneous => 3,
            Self::Initialized => 4,
            Self::Request => 5,
            Self::Activation => 6,
            Self::ActivationConfirm => 7,
            Self::Deactivation => 8,
            Self::DeactivationConfirm => 9,
            Self::ActivationTermination => 10,
            Self::ReturnRemoteCommand => 11,
            Self::ReturnLocalCommand => 12,
            Self::InterrogatedBy(group) => 20 + group,
            Self::RequestedByCounter(group) => 37 + group,
            Self::UnknownTypeId => 44,
            Self::UnknownCot => 45,
            Self::UnknownCoa => 46,
            Self::UnknownIoa => 47,
        }
    }

    /// Check if this is a positive confirmation.
    #[inline]
    pub const fn is_confirmation(&self) -> bool {
        matches!(
            self,
            Self::ActivationConfirm | Self::DeactivationConfirm | Self::ActivationTermination
        )
    }

    /// Check if this is one of the negative "unknown X" causes.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        matches!(
            self,
            Self::UnknownTypeId | Self::UnknownCot | Self::UnknownCoa | Self::UnknownIoa
        )
    }

    /// Check if this COT carries an interrogation response.
    #[inline]
    pub const fn is_interrogation_response(&self) -> bool {
        matches!(self, Self::InterrogatedBy(_))
    }
}

impl std::fmt::Display for Cot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InterrogatedBy(0) => write!(f, "InterrogatedByStation"),
            Self::InterrogatedBy(group) => write!(f, "InterrogatedByGroup{}", group),
            Self::RequestedByCounter(0) => write!(f, "RequestedByGeneralCounter"),
            Self::RequestedByCounter(group) => write!(f, "RequestedByGroup{}Counter", group),
            other => write!(f, "{:?}", other),
        }
    }
}
