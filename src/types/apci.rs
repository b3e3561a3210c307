//! APCI (Application Protocol Control Information).
//!
//! The 6-byte header of an APDU: start byte, length, and four control octets
//! carrying the frame discriminator and the 15-bit sequence numbers.

use crate::error::{LinkError, Result};

/// Start byte for IEC 104 frames.
pub const START_BYTE: u8 = 0x68;

/// Minimum APDU length (APCI control field only, no ASDU).
pub const MIN_APDU_LENGTH: usize = 4;

/// Maximum APDU length.
pub const MAX_APDU_LENGTH: usize = 253;

/// Maximum sequence number (15 bits).
pub const MAX_SEQ: u16 = 0x7FFF;

/// Modulus for sequence-number arithmetic.
pub const SEQ_MODULO: u16 = 0x8000;

/// U-format control function codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UFunction {
    /// STARTDT act (start data transfer request)
    StartDtAct,
    /// STARTDT con (start data transfer confirm)
    StartDtCon,
    /// STOPDT act (stop data transfer request)
    StopDtAct,
    /// STOPDT con (stop data transfer confirm)
    StopDtCon,
    /// TESTFR act (test frame request)
    TestFrAct,
    /// TESTFR con (test frame confirm)
    TestFrCon,
}

impl UFunction {
    /// Control-octet-1 encoding for this function.
    #[inline]
    pub const fn control_byte(&self) -> u8 {
        match self {
            Self::StartDtAct => 0x07,
            Self::StartDtCon => 0x0B,
            Self::StopDtAct => 0x13,
            Self::StopDtCon => 0x23,
            Self::TestFrAct => 0x43,
            Self::TestFrCon => 0x83,
        }
    }

    /// Parse the control function from control-octet-1.
    #[inline]
    pub fn from_control_byte(byte: u8) -> Result<Self> {
        match byte {
            0x07 => Ok(Self::StartDtAct),
            0x0B => Ok(Self::StartDtCon),
            0x13 => Ok(Self::StopDtAct),
            0x23 => Ok(Self::StopDtCon),
            0x43 => Ok(Self::TestFrAct),
            0x83 => Ok(Self::TestFrCon),
            _ => Err(LinkError::invalid_frame(format!(
                "Unknown U-format function: 0x{:02X}",
                byte
            ))),
        }
    }

    /// Whether this is a confirm (as opposed to a request).
    #[inline]
    pub const fn is_confirm(&self) -> bool {
        matches!(self, Self::StartDtCon | Self::StopDtCon | Self::TestFrCon)
    }
}

/// The four control octets of an APDU, discriminated into the three formats.
///
/// ```text
/// +--------+--------+--------+--------+--------+--------+
/// | 0x68   | Length | CF1    | CF2    | CF3    | CF4    |
/// +--------+--------+--------+--------+--------+--------+
/// ```
///
/// Bit 0 of CF1 selects I-format (0) vs S/U; bit 1 then selects S (0) vs
/// U (1). Sequence numbers occupy bits 1-15 of each two-octet pair, little
/// endian, with the low discriminator bit masked out before arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Apci {
    /// I-format: numbered information transfer.
    IFormat {
        /// Send sequence number (0..=32767)
        send_seq: u16,
        /// Receive sequence number (0..=32767)
        recv_seq: u16,
    },
    /// S-format: pure acknowledgment.
    SFormat {
        /// Receive sequence number (0..=32767)
        recv_seq: u16,
    },
    /// U-format: unnumbered control function.
    UFormat {
        /// Control function
        function: UFunction,
    },
}

impl Apci {
    /// Create an I-format APCI.
    #[inline]
    pub fn i_format(send_seq: u16, recv_seq: u16) -> Self {
        Self::IFormat { send_seq, recv_seq }
    }

    /// Create an S-format APCI.
    #[inline]
    pub fn s_format(recv_seq: u16) -> Self {
        Self::SFormat { recv_seq }
    }

    /// Create a U-format APCI.
    #[inline]
    pub fn u_format(function: UFunction) -> Self {
        Self::UFormat { function }
    }

    /// Parse the four control octets.
    pub fn parse(control: &[u8]) -> Result<Self> {
        if control.len() < 4 {
            return Err(LinkError::invalid_frame("Control field too short"));
        }

        let cf1 = control[0];

        if cf1 & 0x01 == 0 {
            // I-format: bit 0 = 0; mask the discriminator bit before shifting
            let send_seq = ((control[1] as u16) << 7) | ((cf1 >> 1) as u16);
            let recv_seq = ((control[3] as u16) << 7) | ((control[2] >> 1) as u16);
            if control[2] & 0x01 != 0 {
                return Err(LinkError::invalid_frame("Reserved bit set in CF3"));
            }
            Ok(Self::IFormat { send_seq, recv_seq })
        } else if cf1 & 0x03 == 0x01 {
            // S-format: bits 0-1 = 01
            let recv_seq = ((control[3] as u16) << 7) | ((control[2] >> 1) as u16);
            Ok(Self::SFormat { recv_seq })
        } else {
            // U-format: bits 0-1 = 11
            let function = UFunction::from_control_byte(cf1)?;
            Ok(Self::UFormat { function })
        }
    }

    /// Encode to four control octets.
    ///
    /// Call [`Apci::validate`] first; sequence numbers above [`MAX_SEQ`]
    /// would silently alias here.
    #[inline]
    pub fn encode(&self) -> [u8; 4] {
        match self {
            Self::IFormat { send_seq, recv_seq } => [
                ((send_seq & 0x7F) << 1) as u8,
                (send_seq >> 7) as u8,
                ((recv_seq & 0x7F) << 1) as u8,
                (recv_seq >> 7) as u8,
            ],
            Self::SFormat { recv_seq } => [
                0x01,
                0x00,
                ((recv_seq & 0x7F) << 1) as u8,
                (recv_seq >> 7) as u8,
            ],
            Self::UFormat { function } => [function.control_byte(), 0x00, 0x00, 0x00],
        }
    }

    /// Reject sequence numbers outside the 15-bit range.
    pub fn validate(&self) -> Result<()> {
        let check = |seq: u16| {
            if seq > MAX_SEQ {
                Err(LinkError::SequenceOutOfRange(seq))
            } else {
                Ok(())
            }
        };
        match self {
            Self::IFormat { send_seq, recv_seq } => {
                check(*send_seq)?;
                check(*recv_seq)
            }
            Self::SFormat { recv_seq } => check(*recv_seq),
            Self::UFormat { .. } => Ok(()),
        }
    }

    /// Encode the full 6-byte APDU header.
    ///
    /// `asdu_len` is the length of the ASDU that follows (0 for S/U-format).
    #[inline]
    pub fn encode_header(&self, asdu_len: usize) -> [u8; 6] {
        let control = self.encode();
        let apdu_len = (4 + asdu_len) as u8;
        [
            START_BYTE, apdu_len, control[0], control[1], control[2], control[3],
        ]
    }

    /// Check if this is an I-format APCI.
    #[inline]
    pub fn is_i_format(&self) -> bool {
        matches!(self, Self::IFormat { .. })
    }

    /// Check if this is an S-format APCI.
    #[inline]
    pub fn is_s_format(&self) -> bool {
        matches!(self, Self::SFormat { .. })
    }

    /// Check if this is a U-format APCI.
    #[inline]
    pub fn is_u_format(&self) -> bool {
        matches!(self, Self::UFormat { .. })
    }

    /// Get the send sequence number (I-format only).
    #[inline]
    pub fn send_seq(&self) -> Option<u16> {
        match self {
            Self::IFormat { send_seq, .. } => Some(*send_seq),
            _ => None,
        }
    }

    /// Get the receive sequence number (I-format and S-format).
    #[inline]
    pub fn recv_seq(&self) -> Option<u16> {
        match self {
            Self::IFormat { recv_seq, .. } | Self::SFormat { recv_seq } => Some(*recv_seq),
            _ => None,
        }
    }
}

impl std::fmt::Display for Apci {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IFormat { send_seq, recv_seq } => write!(f, "I(S={}, R={})", send_seq, recv_seq),
            Self::SFormat { recv_seq } => write!(f, "S(R={})", recv_seq),
            Self::UFormat { function } => {
                let name = match function {
                    UFunction::StartDtAct => "STARTDT act",
                    UFunction::StartDtCon => "STARTDT con",
                    UFunction::StopDtAct => "STOPDT act",
                    UFunction::StopDtCon => "STOPDT con",
                    UFunction::TestFrAct => "TESTFR act",
                    UFunction::TestFrCon => "TESTFR con",
                };
                write!(f, "U({})", name)
            }
        }
    }
}
