//! ASDU (Application Service Data Unit).
//!
//! The payload of an I-format APDU: type identifier, variable structure
//! qualifier, cause of transmission, addressing, and information objects.
//! Header field widths follow the engine's [`ProtocolConfig`].

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::ProtocolConfig;
use crate::error::{LinkError, Result};
use crate::types::{Cot, TypeId};

/// Variable Structure Qualifier (VSQ).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vsq {
    /// Number of information objects (1-127)
    pub count: u8,
    /// If true, object addresses are sequential (SQ=1)
    pub sequence: bool,
}

impl Vsq {
    /// Create a new VSQ.
    #[inline]
    pub const fn new(count: u8, sequence: bool) -> Self {
        Self { count, sequence }
    }

    /// Parse VSQ from its byte.
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        Self {
            count: value & 0x7F,
            sequence: (value & 0x80) != 0,
        }
    }

    /// Encode VSQ to its byte.
    #[inline]
    pub const fn as_u8(&self) -> u8 {
        (self.count & 0x7F) | if self.sequence { 0x80 } else { 0 }
    }
}

/// Information Object Address.
///
/// 2 or 3 bytes on the wire depending on the profile; stored widened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ioa(pub u32);

impl Ioa {
    /// Create an IOA, masked to 24 bits.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value & 0x00FF_FFFF)
    }

    /// Parse an IOA of the given width (little-endian).
    pub fn parse(bytes: &[u8], width: usize) -> Result<Self> {
        if bytes.len() < width {
            return Err(LinkError::invalid_asdu("IOA truncated"));
        }
        let mut value = 0u32;
        for (i, byte) in bytes[..width].iter().enumerate() {
            value |= (*byte as u32) << (8 * i);
        }
        Ok(Self(value))
    }

    /// Encode the IOA at the given width (little-endian).
    pub fn encode_to(&self, buf: &mut BytesMut, width: usize) {
        for i in 0..width {
            buf.put_u8(((self.0 >> (8 * i)) & 0xFF) as u8);
        }
    }

    /// Get the raw value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Ioa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ASDU header (fixed part, width per profile).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsduHeader {
    /// Type identification
    pub type_id: TypeId,
    /// Variable structure qualifier
    pub vsq: Vsq,
    /// Cause of transmission
    pub cot: Cot,
    /// Test flag (bit 7 of the COT byte)
    pub test: bool,
    /// Negative confirmation flag (bit 6 of the COT byte)
    pub negative: bool,
    /// Originator address (0 when the profile omits it)
    pub originator: u8,
    /// Common address of ASDU (station address)
    pub common_address: u16,
}

impl AsduHeader {
    /// Create a new ASDU header with default flags.
    pub fn new(type_id: TypeId, count: u8, cot: Cot, common_address: u16) -> Self {
        Self {
            type_id,
            vsq: Vsq::new(count, false),
            cot,
            test: false,
            negative: false,
            originator: 0,
            common_address,
        }
    }

    /// Parse an ASDU header using the profile's field widths.
    ///
    /// Returns the header and the number of bytes consumed.
    pub fn parse(data: &[u8], config: &ProtocolConfig) -> Result<(Self, usize)> {
        let size = config.asdu_header_size();
        if data.len() < size {
            return Err(LinkError::invalid_asdu("ASDU header too short"));
        }

        let type_id = TypeId::from_u8(data[0])?;
        let vsq = Vsq::from_u8(data[1]);
        let cot = Cot::from_u8(data[2])?;
        let test = (data[2] & 0x80) != 0;
        let negative = (data[2] & 0x40) != 0;

        let mut offset = 3;
        let originator = if config.originator_width == 1 {
            let org = data[offset];
            offset += 1;
            org
        } else {
            0
        };

        let common_address = if config.coa_width == 2 {
            data[offset] as u16 | ((data[offset + 1] as u16) << 8)
        } else {
            data[offset] as u16
        };
        offset += config.coa_width;

        config.check_coa(common_address)?;

        Ok((
            Self {
                type_id,
                vsq,
                cot,
                test,
                negative,
                originator,
                common_address,
            },
            offset,
        ))
    }

    /// Encode the header using the profile's field widths.
    pub fn encode(&self, buf: &mut BytesMut, config: &ProtocolConfig) {
        buf.put_u8(self.type_id.as_u8());
        buf.put_u8(self.vsq.as_u8());

        let mut cot_byte = self.cot.as_u8();
        if self.test {
            cot_byte |= 0x80;
        }
        if self.negative {
            cot_byte |= 0x40;
        }
        buf.put_u8(cot_byte);

        if config.originator_width == 1 {
            buf.put_u8(self.originator);
        }
        if config.coa_width == 2 {
            buf.put_u16_le(self.common_address);
        } else {
            buf.put_u8(self.common_address as u8);
        }
    }
}

/// CP56Time2a timestamp (7 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cp56Time2a {
    /// Milliseconds (0-59999)
    pub milliseconds: u16,
    /// Minutes (0-59)
    pub minutes: u8,
    /// Hours (0-23)
    pub hours: u8,
    /// Day of month (1-31)
    pub day: u8,
    /// Day of week (1-7, 1=Monday)
    pub day_of_week: u8,
    /// Month (1-12)
    pub month: u8,
    /// Year (0-99, years since 2000)
    pub year: u8,
    /// Invalid flag
    pub invalid: bool,
    /// Summer time flag
    pub summer_time: bool,
}

impl Cp56Time2a {
    /// Parse from 7 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 7 {
            return Err(LinkError::invalid_asdu("CP56Time2a too short"));
        }

        Ok(Self {
            milliseconds: bytes[0] as u16 | ((bytes[1] as u16) << 8),
            minutes: bytes[2] & 0x3F,
            invalid: (bytes[2] & 0x80) != 0,
            hours: bytes[3] & 0x1F,
            summer_time: (bytes[3] & 0x80) != 0,
            day: bytes[4] & 0x1F,
            day_of_week: (bytes[4] >> 5) & 0x07,
            month: bytes[5] & 0x0F,
            year: bytes[6] & 0x7F,
        })
    }

    /// Encode to 7 bytes.
    pub fn to_bytes(&self) -> [u8; 7] {
        [
            (self.milliseconds & 0xFF) as u8,
            ((self.milliseconds >> 8) & 0xFF) as u8,
            (self.minutes & 0x3F) | if self.invalid { 0x80 } else { 0 },
            (self.hours & 0x1F) | if self.summer_time { 0x80 } else { 0 },
            (self.day & 0x1F) | ((self.day_of_week & 0x07) << 5),
            self.month & 0x0F,
            self.year & 0x7F,
        ]
    }
}

/// Information object: an address plus its type-specific element bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct InformationObject {
    /// Information object address
    pub ioa: Ioa,
    /// Raw element bytes (value + quality descriptor + optional time tag)
    pub data: Bytes,
}

impl InformationObject {
    /// Create a new information object.
    pub fn new(ioa: Ioa, data: Bytes) -> Self {
        Self { ioa, data }
    }
}

/// Complete ASDU.
///
/// Decoded ASDUs keep their object region as `raw_data`; the parser turns it
/// into typed values on demand. Outgoing ASDUs carry explicit `objects`.
#[derive(Debug, Clone, PartialEq)]
pub struct Asdu {
    /// ASDU header
    pub header: AsduHeader,
    /// Information objects (outgoing direction)
    pub objects: Vec<InformationObject>,
    /// Raw object region (incoming direction)
    pub raw_data: Bytes,
}

impl Asdu {
    /// Create a new empty ASDU.
    pub fn new(header: AsduHeader) -> Self {
        Self {
            header,
            objects: Vec::new(),
            raw_data: Bytes::new(),
        }
    }

    /// Station interrogation command (C_IC_NA_1, QOI 20 for global).
    pub fn interrogation_command(common_address: u16, qoi: u8) -> Self {
        let mut asdu = Self::new(AsduHeader::new(
            TypeId::InterrogationCommand,
            1,
            Cot::Activation,
            common_address,
        ));
        asdu.objects.push(InformationObject::new(
            Ioa::new(0),
            Bytes::copy_from_slice(&[qoi]),
        ));
        asdu
    }

    /// Counter interrogation command (C_CI_NA_1).
    pub fn counter_interrogation(common_address: u16, group: u8) -> Self {
        let mut asdu = Self::new(AsduHeader::new(
            TypeId::CounterInterrogation,
            1,
            Cot::Activation,
            common_address,
        ));
        asdu.objects.push(InformationObject::new(
            Ioa::new(0),
            Bytes::copy_from_slice(&[group]),
        ));
        asdu
    }

    /// Clock synchronization command (C_CS_NA_1).
    pub fn clock_sync_command(common_address: u16, time: Cp56Time2a) -> Self {
        let mut asdu = Self::new(AsduHeader::new(
            TypeId::ClockSync,
            1,
            Cot::Activation,
            common_address,
        ));
        asdu.objects.push(InformationObject::new(
            Ioa::new(0),
            Bytes::copy_from_slice(&time.to_bytes()),
        ));
        asdu
    }

    /// Single command (C_SC_NA_1). `select` sets the S/E bit.
    pub fn single_command(common_address: u16, ioa: u32, value: bool, select: bool) -> Self {
        let mut asdu = Self::new(AsduHeader::new(
            TypeId::SingleCommand,
            1,
            Cot::Activation,
            common_address,
        ));
        let sco = if value { 0x01 } else { 0x00 } | if select { 0x80 } else { 0x00 };
        asdu.objects.push(InformationObject::new(
            Ioa::new(ioa),
            Bytes::copy_from_slice(&[sco]),
        ));
        asdu
    }

    /// Parse an ASDU body (the bytes after the APCI).
    pub fn parse(data: &[u8], config: &ProtocolConfig) -> Result<Self> {
        let (header, header_len) = AsduHeader::parse(data, config)?;
        let raw_data = Bytes::copy_from_slice(&data[header_len..]);

        Ok(Self {
            header,
            objects: Vec::new(),
            raw_data,
        })
    }

    /// Encode the ASDU into the provided buffer.
    pub fn encode_to(&self, buf: &mut BytesMut, config: &ProtocolConfig) {
        self.header.encode(buf, config);

        for obj in &self.objects {
            obj.ioa.encode_to(buf, config.ioa_width);
            buf.put_slice(&obj.data);
        }

        if self.objects.is_empty() && !self.raw_data.is_empty() {
            buf.put_slice(&self.raw_data);
        }
    }

    /// Encoded length of this ASDU for the given profile.
    pub fn encoded_len(&self, config: &ProtocolConfig) -> usize {
        let mut len = config.asdu_header_size();
        for obj in &self.objects {
            len += config.ioa_width + obj.data.len();
        }
        if self.objects.is_empty() {
            len += self.raw_data.len();
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vsq() {
        let vsq = Vsq::new(10, false);
        assert_eq!(vsq.as_u8(), 10);

        let vsq = Vsq::new(10, true);
        assert_eq!(vsq.as_u8(), 0x8A);

        let vsq = Vsq::from_u8(0x8A);
        assert_eq!(vsq.count, 10);
        assert!(vsq.sequence);
    }

    #[test]
    fn test_ioa_three_byte() {
        let ioa = Ioa::new(0x123456);
        let mut buf = BytesMut::new();
        ioa.encode_to(&mut buf, 3);
        assert_eq!(&buf[..], &[0x56, 0x34, 0x12]);

        let parsed = Ioa::parse(&buf, 3).unwrap();
        assert_eq!(parsed.value(), 0x123456);
    }

    #[test]
    fn test_ioa_two_byte() {
        let ioa = Ioa::new(0x1234);
        let mut buf = BytesMut::new();
        ioa.encode_to(&mut buf, 2);
        assert_eq!(&buf[..], &[0x34, 0x12]);

        let parsed = Ioa::parse(&buf, 2).unwrap();
        assert_eq!(parsed.value(), 0x1234);
    }

    #[test]
    fn test_ioa_truncated() {
        assert!(Ioa::parse(&[0x01, 0x02], 3).is_err());
    }

    #[test]
    fn test_header_roundtrip_default_profile() {
        let config = ProtocolConfig::default();
        let header = AsduHeader::new(TypeId::MeasuredFloat, 5, Cot::Spontaneous, 1);
        let mut buf = BytesMut::new();
        header.encode(&mut buf, &config);
        assert_eq!(buf.len(), 6);

        let (parsed, consumed) = AsduHeader::parse(&buf, &config).unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_header_roundtrip_narrow_profile() {
        let config = ProtocolConfig::new().originator_width(0).coa_width(1);
        let header = AsduHeader::new(TypeId::SinglePoint, 1, Cot::Periodic, 9);
        let mut buf = BytesMut::new();
        header.encode(&mut buf, &config);
        assert_eq!(buf.len(), 4);

        let (parsed, consumed) = AsduHeader::parse(&buf, &config).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(parsed.common_address, 9);
        assert_eq!(parsed.originator, 0);
    }

    #[test]
    fn test_header_flags() {
        let config = ProtocolConfig::default();
        let mut header = AsduHeader::new(TypeId::SingleCommand, 1, Cot::ActivationConfirm, 3);
        header.negative = true;
        header.test = true;

        let mut buf = BytesMut::new();
        header.encode(&mut buf, &config);
        assert_eq!(buf[2] & 0xC0, 0xC0);

        let (parsed, _) = AsduHeader::parse(&buf, &config).unwrap();
        assert!(parsed.negative);
        assert!(parsed.test);
        assert_eq!(parsed.cot, Cot::ActivationConfirm);
    }

    #[test]
    fn test_header_rejects_unknown_coa() {
        let config = ProtocolConfig::new().valid_coas(vec![1]);
        let header = AsduHeader::new(TypeId::SinglePoint, 1, Cot::Spontaneous, 2);
        let mut buf = BytesMut::new();
        header.encode(&mut buf, &config);

        assert!(matches!(
            AsduHeader::parse(&buf, &config),
            Err(LinkError::BadCoa(2))
        ));
    }

    #[test]
    fn test_cp56time2a_roundtrip() {
        let time = Cp56Time2a {
            milliseconds: 30000,
            minutes: 30,
            hours: 12,
            day: 15,
            day_of_week: 3,
            month: 6,
            year: 26,
            invalid: false,
            summer_time: true,
        };

        let parsed = Cp56Time2a::from_bytes(&time.to_bytes()).unwrap();
        assert_eq!(parsed, time);
    }

    #[test]
    fn test_interrogation_command_encoding() {
        let config = ProtocolConfig::default();
        let asdu = Asdu::interrogation_command(1, 20);
        let mut buf = BytesMut::new();
        asdu.encode_to(&mut buf, &config);

        // header (6) + IOA (3) + QOI (1)
        assert_eq!(buf.len(), 10);
        assert_eq!(buf[0], TypeId::InterrogationCommand.as_u8());
        assert_eq!(buf[2] & 0x3F, Cot::Activation.as_u8());
        assert_eq!(buf[9], 20);
        assert_eq!(asdu.encoded_len(&config), 10);
    }

    #[test]
    fn test_asdu_parse_keeps_raw_objects() {
        let config = ProtocolConfig::default();
        let asdu = Asdu::single_command(1, 42, true, false);
        let mut buf = BytesMut::new();
        asdu.encode_to(&mut buf, &config);

        let parsed = Asdu::parse(&buf, &config).unwrap();
        assert_eq!(parsed.header, asdu.header);
        assert_eq!(parsed.raw_data.len(), 4); // IOA (3) + SCO (1)
        assert_eq!(parsed.raw_data[3], 0x01);
    }
}
