//! Quality descriptor bitmask.
//!
//! One byte of orthogonal quality flags carried with every information
//! object value. `GOOD` is the all-clear zero value; the type always carries
//! an explicit quality, never "absent".

use std::ops::{BitOr, BitOrAssign};

/// Quality bitmask over the seven defined flags.
///
/// Flags compose with `|` (associative, commutative) and decompose
/// losslessly via [`Quality::flags`]. Bits outside the defined set are
/// masked out on construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Quality(u8);

impl Quality {
    /// All-clear value, no flags set
    pub const GOOD: Quality = Quality(0);
    /// Overflow (OV)
    pub const OVERFLOW: Quality = Quality(0x01);
    /// Reserved flag
    pub const RESERVED: Quality = Quality(0x04);
    /// Elapsed time invalid (EI)
    pub const ELAPSED_TIME_INVALID: Quality = Quality(0x08);
    /// Blocked (BL)
    pub const BLOCKED: Quality = Quality(0x10);
    /// Substituted (SB)
    pub const SUBSTITUTED: Quality = Quality(0x20);
    /// Not topical (NT)
    pub const NON_TOPICAL: Quality = Quality(0x40);
    /// Invalid (IV)
    pub const INVALID: Quality = Quality(0x80);

    const ALL: u8 = 0xFD;

    const FLAGS: [(Quality, &'static str); 7] = [
        (Self::OVERFLOW, "OV"),
        (Self::RESERVED, "RES"),
        (Self::ELAPSED_TIME_INVALID, "EI"),
        (Self::BLOCKED, "BL"),
        (Self::SUBSTITUTED, "SB"),
        (Self::NON_TOPICAL, "NT"),
        (Self::INVALID, "IV"),
    ];

    /// Construct from a raw descriptor byte, masking undefined bits.
    #[inline]
    pub const fn from_bits(raw: u8) -> Self {
        Self(raw & Self::ALL)
    }

    /// Raw bitmask value.
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Test whether all flags in `other` are set.
    #[inline]
    pub const fn contains(self, other: Quality) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if the quality is good (no flags set).
    #[inline]
    pub const fn is_good(self) -> bool {
        self.0 == 0
    }

    /// Whether the value may be delivered as valid process data.
    ///
    /// Only a purely substituted value keeps the unit acceptable; any other
    /// flag requires the same handling as an invalid value.
    #[inline]
    pub const fn is_acceptable(self) -> bool {
        self.0 == 0 || self.0 == Self::SUBSTITUTED.0
    }

    /// Decompose into the set of active flags.
    pub fn flags(self) -> Vec<Quality> {
        Self::FLAGS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(flag, _)| *flag)
            .collect()
    }

    /// Parse from an SIQ/DIQ byte (value bits in positions 0-1 are ignored).
    #[inline]
    pub const fn from_siq(raw: u8) -> Self {
        Self::from_bits(raw & 0xF0)
    }

    /// Parse from a QDS byte (measured value quality descriptor).
    #[inline]
    pub const fn from_qds(raw: u8) -> Self {
        Self::from_bits(raw)
    }
}

impl BitOr for Quality {
    type Output = Quality;

    #[inline]
    fn bitor(self, rhs: Quality) -> Quality {
        Quality(self.0 | rhs.0)
    }
}

impl BitOrAssign for Quality {
    #[inline]
    fn bitor_assign(&mut self, rhs: Quality) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Debug for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Quality({})", self)
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_good() {
            return write!(f, "GOOD");
        }
        let mut first = true;
        for (flag, name) in Self::FLAGS {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}
