//! Type identification.
//!
//! The set of ASDU types this engine supports. Anything outside this set
//! decodes to an unknown-type error and is classified TYPE_UNSUPPORTED.

use crate::error::{LinkError, Result};

/// ASDU type identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    /// Single-point information (M_SP_NA_1)
    SinglePoint = 1,

    /// Double-point information (M_DP_NA_1)
    DoublePoint = 3,

    /// Step position information (M_ST_NA_1)
    StepPosition = 5,

    /// Bitstring of 32 bit (M_BO_NA_1)
    Bitstring32 = 7,

    /// Measured value, normalized (M_ME_NA_1)
    MeasuredNormalized = 9,

    /// Measured value, scaled (M_ME_NB_1)
    MeasuredScaled = 11,

    /// Measured value, short floating point (M_ME_NC_1)
    MeasuredFloat = 13,

    /// Integrated totals (M_IT_NA_1)
    IntegratedTotals = 15,

    /// Single-point information with time tag CP56Time2a (M_SP_TB_1)
    SinglePointTime56 = 30,

    /// Double-point information with time tag CP56Time2a (M_DP_TB_1)
    DoublePointTime56 = 31,

    /// Measured value, short floating point with time tag CP56Time2a (M_ME_TF_1)
    MeasuredFloatTime56 = 36,

    /// Single command (C_SC_NA_1)
    SingleCommand = 45,

    /// Double command (C_DC_NA_1)
    DoubleCommand = 46,

    /// Set-point command, short floating point (C_SE_NC_1)
    SetpointFloat = 50,

    /// End of initialization (M_EI_NA_1)
    EndOfInit = 70,

    /// Interrogation command (C_IC_NA_1)
    InterrogationCommand = 100,

    /// Counter interrogation command (C_CI_NA_1)
    CounterInterrogation = 101,

    /// Clock synchronization command (C_CS_NA_1)
    ClockSync = 103,

    /// Test command (C_TS_NA_1)
    TestCommand = 104,
}

impl TypeId {
    /// Create TypeId from raw byte value.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::SinglePoint),
            3 => Ok(Self::DoublePoint),
            5 => Ok(Self::StepPosition),
            7 => Ok(Self::Bitstring32),
            9 => Ok(Self::MeasuredNormalized),
            11 => Ok(Self::MeasuredScaled),
            13 => Ok(Self::MeasuredFloat),
            15 => Ok(Self::IntegratedTotals),
            30 => Ok(Self::SinglePointTime56),
            31 => Ok(Self::DoublePointTime56),
            36 => Ok(Self::MeasuredFloatTime56),
            45 => Ok(Self::SingleCommand),
            46 => Ok(Self::DoubleCommand),
            50 => Ok(Self::SetpointFloat),
            70 => Ok(Self::EndOfInit),
            100 => Ok(Self::InterrogationCommand),
            101 => Ok(Self::CounterInterrogation),
            103 => Ok(Self::ClockSync),
            104 => Ok(Self::TestCommand),
            _ => Err(LinkError::UnknownTypeId(value)),
        }
    }

    /// Convert to raw byte value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if this type is in the monitoring direction (outstation to master).
    #[inline]
    pub const fn is_monitoring(&self) -> bool {
        matches!(self.as_u8(), 1..=44 | 70)
    }

    /// Check if this type is in the control direction (master to outstation).
    #[inline]
    pub const fn is_control(&self) -> bool {
        matches!(self.as_u8(), 45..=69 | 100..=107)
    }

    /// Check if this type carries a CP56Time2a time tag.
    #[inline]
    pub const fn has_time_tag(&self) -> bool {
        matches!(
            self,
            Self::SinglePointTime56 | Self::DoublePointTime56 | Self::MeasuredFloatTime56
        )
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let supported = [
            1u8, 3, 5, 7, 9, 11, 13, 15, 30, 31, 36, 45, 46, 50, 70, 100, 101, 103, 104,
        ];
        for val in supported {
            let type_id = TypeId::from_u8(val).unwrap();
            assert_eq!(type_id.as_u8(), val);
        }
    }

    #[test]
    fn test_unsupported_rejected() {
        for val in [0u8, 2, 21, 37, 48, 58, 110, 127, 255] {
            assert!(
                matches!(TypeId::from_u8(val), Err(LinkError::UnknownTypeId(v)) if v == val),
                "Expected UnknownTypeId for {}",
                val
            );
        }
    }

    #[test]
    fn test_direction() {
        assert!(TypeId::SinglePoint.is_monitoring());
        assert!(TypeId::MeasuredFloat.is_monitoring());
        assert!(TypeId::EndOfInit.is_monitoring());
        assert!(!TypeId::SingleCommand.is_monitoring());

        assert!(TypeId::SingleCommand.is_control());
        assert!(TypeId::InterrogationCommand.is_control());
        assert!(!TypeId::DoublePoint.is_control());
    }

    #[test]
    fn test_time_tag() {
        assert!(TypeId::SinglePointTime56.has_time_tag());
        assert!(TypeId::MeasuredFloatTime56.has_time_tag());
        assert!(!TypeId::MeasuredFloat.has_time_tag());
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeId::SinglePoint.to_string(), "SinglePoint(1)");
        assert_eq!(
            TypeId::InterrogationCommand.to_string(),
            "InterrogationCommand(100)"
        );
    }
}
