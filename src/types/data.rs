//! Decoded information object values.
//!
//! The unified shape the parser produces for upstream consumers: one
//! [`DataPoint`] per information object, carrying its address, typed value,
//! quality bitmask, and optional time tag.

use crate::types::{Cp56Time2a, Quality};

/// A decoded information object value.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    /// Information object address
    pub ioa: u32,
    /// Typed value
    pub value: DataValue,
    /// Quality bitmask (always explicit, never absent)
    pub quality: Quality,
    /// Time tag, when the type carries one
    pub timestamp: Option<Cp56Time2a>,
}

impl DataPoint {
    /// Create a data point with good quality and no time tag.
    #[inline]
    pub const fn new(ioa: u32, value: DataValue) -> Self {
        Self {
            ioa,
            value,
            quality: Quality::GOOD,
            timestamp: None,
        }
    }

    /// Create a data point with explicit quality.
    #[inline]
    pub const fn with_quality(ioa: u32, value: DataValue, quality: Quality) -> Self {
        Self {
            ioa,
            value,
            quality,
            timestamp: None,
        }
    }

    /// Check if the data point has good quality.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.quality.is_good()
    }
}

/// Double-point value (two-bit state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoublePointValue {
    /// Indeterminate or intermediate (00)
    Indeterminate,
    /// Determined OFF (01)
    Off,
    /// Determined ON (10)
    On,
    /// Indeterminate or faulty (11)
    IndeterminateOrFaulty,
}

impl DoublePointValue {
    /// Parse from the lower 2 bits of a DIQ byte.
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x03 {
            1 => Self::Off,
            2 => Self::On,
            3 => Self::IndeterminateOrFaulty,
            _ => Self::Indeterminate,
        }
    }
}

/// Typed value variants for decoded information objects.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Single-point information
    Single(bool),
    /// Double-point information
    Double(DoublePointValue),
    /// Normalized value, -1.0 to +1.0
    Normalized(f32),
    /// Scaled value
    Scaled(i16),
    /// Short floating point
    Float(f32),
    /// Integrated totals / counter reading
    Counter(i32),
    /// Bitstring of 32 bits
    Bitstring(u32),
    /// Step position (-64 to +63), transient flag
    StepPosition { value: i8, transient: bool },
}

impl DataValue {
    /// Convert to f64 if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Single(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Double(v) => match v {
                DoublePointValue::Off => Some(0.0),
                DoublePointValue::On => Some(1.0),
                _ => None,
            },
            Self::Normalized(v) => Some(*v as f64),
            Self::Scaled(v) => Some(*v as f64),
            Self::Float(v) => Some(*v as f64),
            Self::Counter(v) => Some(*v as f64),
            Self::Bitstring(v) => Some(*v as f64),
            Self::StepPosition { value, .. } => Some(*value as f64),
        }
    }

    /// Convert to bool if boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Single(v) => Some(*v),
            Self::Double(DoublePointValue::Off) => Some(false),
            Self::Double(DoublePointValue::On) => Some(true),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_point_from_u8() {
        assert_eq!(DoublePointValue::from_u8(0), DoublePointValue::Indeterminate);
        assert_eq!(DoublePointValue::from_u8(1), DoublePointValue::Off);
        assert_eq!(DoublePointValue::from_u8(2), DoublePointValue::On);
        assert_eq!(
            DoublePointValue::from_u8(3),
            DoublePointValue::IndeterminateOrFaulty
        );
        // Upper bits carry quality and must be ignored
        assert_eq!(DoublePointValue::from_u8(0x82), DoublePointValue::On);
    }

    #[test]
    fn test_as_f64() {
        assert_eq!(DataValue::Single(true).as_f64(), Some(1.0));
        assert_eq!(DataValue::Scaled(-7).as_f64(), Some(-7.0));
        assert_eq!(DataValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(
            DataValue::Double(DoublePointValue::Indeterminate).as_f64(),
            None
        );
    }

    #[test]
    fn test_as_bool() {
        assert_eq!(DataValue::Single(false).as_bool(), Some(false));
        assert_eq!(
            DataValue::Double(DoublePointValue::On).as_bool(),
            Some(true)
        );
        assert_eq!(DataValue::Float(1.0).as_bool(), None);
    }

    #[test]
    fn test_data_point_quality() {
        let point = DataPoint::new(100, DataValue::Single(true));
        assert!(point.is_good());

        let point =
            DataPoint::with_quality(100, DataValue::Single(true), Quality::INVALID);
        assert!(!point.is_good());
    }
}
