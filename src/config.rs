//! Per-engine protocol profile.
//!
//! IEC 60870-5 leaves the originator address, common address, and information
//! object address widths to the companion standard profile. The engine takes
//! them as explicit configuration at construction so that multiple engine
//! instances with different profiles cannot interfere.

use std::ops::RangeInclusive;

use crate::error::{LinkError, Result};

/// Protocol profile for one engine instance.
///
/// Defaults match the IEC 60870-5-104 companion profile: 1-byte originator
/// address, 2-byte common address, 3-byte information object address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Originator address width in bytes (0 or 1)
    pub originator_width: usize,
    /// Common address width in bytes (1 or 2)
    pub coa_width: usize,
    /// Information object address width in bytes (2 or 3)
    pub ioa_width: usize,
    /// Valid IOA range for the addressed station
    pub ioa_range: RangeInclusive<u32>,
    /// Accepted common addresses; `None` accepts any
    pub valid_coas: Option<Vec<u16>>,
}

impl ProtocolConfig {
    /// Create the default IEC 104 profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the originator address width (0 or 1 bytes).
    pub fn originator_width(mut self, width: usize) -> Self {
        self.originator_width = width;
        self
    }

    /// Set the common address width (1 or 2 bytes).
    pub fn coa_width(mut self, width: usize) -> Self {
        self.coa_width = width;
        self
    }

    /// Set the information object address width (2 or 3 bytes).
    pub fn ioa_width(mut self, width: usize) -> Self {
        self.ioa_width = width;
        self
    }

    /// Restrict the valid IOA range.
    pub fn ioa_range(mut self, range: RangeInclusive<u32>) -> Self {
        self.ioa_range = range;
        self
    }

    /// Restrict the accepted common addresses.
    pub fn valid_coas(mut self, coas: Vec<u16>) -> Self {
        self.valid_coas = Some(coas);
        self
    }

    /// Validate the profile widths.
    pub fn validate(&self) -> Result<()> {
        if self.originator_width > 1 {
            return Err(LinkError::protocol("Originator width must be 0 or 1"));
        }
        if !(1..=2).contains(&self.coa_width) {
            return Err(LinkError::protocol("COA width must be 1 or 2"));
        }
        if !(2..=3).contains(&self.ioa_width) {
            return Err(LinkError::protocol("IOA width must be 2 or 3"));
        }
        Ok(())
    }

    /// Size of the fixed ASDU header for this profile.
    #[inline]
    pub fn asdu_header_size(&self) -> usize {
        // type ID + VSQ + COT
        3 + self.originator_width + self.coa_width
    }

    /// Check an IOA against the configured range.
    #[inline]
    pub fn check_ioa(&self, ioa: u32) -> Result<()> {
        if self.ioa_range.contains(&ioa) {
            Ok(())
        } else {
            Err(LinkError::BadIoa(ioa))
        }
    }

    /// Check a common address against the configured station set.
    #[inline]
    pub fn check_coa(&self, coa: u16) -> Result<()> {
        match &self.valid_coas {
            Some(coas) if !coas.contains(&coa) => Err(LinkError::BadCoa(coa)),
            _ => Ok(()),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            originator_width: 1,
            coa_width: 2,
            ioa_width: 3,
            ioa_range: 0..=0x00FF_FFFF,
            valid_coas: None,
        }
    }
}
