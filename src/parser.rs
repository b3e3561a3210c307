//! Information object parser.
//!
//! Turns the raw object region of a decoded ASDU into typed [`DataPoint`]
//! values, honoring the profile's IOA width and valid range.

use crate::config::ProtocolConfig;
use crate::error::{LinkError, Result};
use crate::types::{
    Asdu, Cp56Time2a, DataPoint, DataValue, DoublePointValue, Ioa, Quality, TypeId,
};

/// Parse all information objects of an ASDU into data points.
///
/// Returns an empty list for command and system types, which carry no
/// process values. An IOA outside the configured range fails the whole ASDU
/// with [`LinkError::BadIoa`].
pub fn parse_asdu(asdu: &Asdu, config: &ProtocolConfig) -> Result<Vec<DataPoint>> {
    let layout = match ElementLayout::for_type(asdu.header.type_id) {
        Some(layout) => layout,
        None => return Ok(Vec::new()),
    };

    let data = asdu.raw_data.as_ref();
    let count = asdu.header.vsq.count as usize;
    let sequence = asdu.header.vsq.sequence;

    if count == 0 {
        return Ok(Vec::new());
    }
    if data.is_empty() {
        return Err(LinkError::invalid_asdu("Empty object region"));
    }

    let ioa_width = config.ioa_width;
    let mut points = Vec::with_capacity(count);

    // With SQ=1 a single IOA leads the region and the rest are sequential
    let first_ioa = Ioa::parse(data, ioa_width)?.value();
    let mut offset = ioa_width;

    for i in 0..count {
        let ioa = if sequence {
            first_ioa + i as u32
        } else if i > 0 {
            let ioa = Ioa::parse(&data[offset..], ioa_width)?.value();
            offset += ioa_width;
            ioa
        } else {
            first_ioa
        };

        config.check_ioa(ioa)?;

        if offset + layout.size() > data.len() {
            return Err(LinkError::invalid_asdu("Object region truncated"));
        }

        let element = &data[offset..offset + layout.element_size];
        let (value, quality) = (layout.decode)(element);
        offset += layout.element_size;

        let timestamp = if layout.has_time_tag {
            let ts = Cp56Time2a::from_bytes(&data[offset..offset + 7])?;
            offset += 7;
            Some(ts)
        } else {
            None
        };

        points.push(DataPoint {
            ioa,
            value,
            quality,
            timestamp,
        });
    }

    Ok(points)
}

/// Wire layout of one information element for a monitoring type.
struct ElementLayout {
    element_size: usize,
    has_time_tag: bool,
    decode: fn(&[u8]) -> (DataValue, Quality),
}

impl ElementLayout {
    fn for_type(type_id: TypeId) -> Option<Self> {
        let layout = match type_id {
            TypeId::SinglePoint => Self::new(1, false, decode_single),
            TypeId::SinglePointTime56 => Self::new(1, true, decode_single),
            TypeId::DoublePoint => Self::new(1, false, decode_double),
            TypeId::DoublePointTime56 => Self::new(1, true, decode_double),
            TypeId::StepPosition => Self::new(2, false, decode_step),
            TypeId::Bitstring32 => Self::new(5, false, decode_bitstring),
            TypeId::MeasuredNormalized => Self::new(3, false, decode_normalized),
            TypeId::MeasuredScaled => Self::new(3, false, decode_scaled),
            TypeId::MeasuredFloat => Self::new(5, false, decode_float),
            TypeId::MeasuredFloatTime56 => Self::new(5, true, decode_float),
            TypeId::IntegratedTotals => Self::new(5, false, decode_counter),
            // Commands and system types carry no process values
            _ => return None,
        };
        Some(layout)
    }

    fn new(element_size: usize, has_time_tag: bool, decode: fn(&[u8]) -> (DataValue, Quality)) -> Self {
        Self {
            element_size,
            has_time_tag,
            decode,
        }
    }

    fn size(&self) -> usize {
        self.element_size + if self.has_time_tag { 7 } else { 0 }
    }
}

fn decode_single(element: &[u8]) -> (DataValue, Quality) {
    let siq = element[0];
    (
        DataValue::Single(siq & 0x01 != 0),
        Quality::from_siq(siq),
    )
}

fn decode_double(element: &[u8]) -> (DataValue, Quality) {
    let diq = element[0];
    (
        DataValue::Double(DoublePointValue::from_u8(diq)),
        Quality::from_siq(diq),
    )
}

fn decode_step(element: &[u8]) -> (DataValue, Quality) {
    let vti = element[0];
    // 7-bit two's complement value, bit 7 is the transient flag
    let value = ((vti << 1) as i8) >> 1;
    (
        DataValue::StepPosition {
            value,
            transient: vti & 0x80 != 0,
        },
        Quality::from_qds(element[1]),
    )
}

fn decode_bitstring(element: &[u8]) -> (DataValue, Quality) {
    let bits = u32::from_le_bytes([element[0], element[1], element[2], element[3]]);
    (DataValue::Bitstring(bits), Quality::from_qds(element[4]))
}

fn decode_normalized(element: &[u8]) -> (DataValue, Quality) {
    let raw = i16::from_le_bytes([element[0], element[1]]);
    (
        DataValue::Normalized(raw as f32 / 32768.0),
        Quality::from_qds(element[2]),
    )
}

fn decode_scaled(element: &[u8]) -> (DataValue, Quality) {
    let raw = i16::from_le_bytes([element[0], element[1]]);
    (DataValue::Scaled(raw), Quality::from_qds(element[2]))
}

fn decode_float(element: &[u8]) -> (DataValue, Quality) {
    let value = f32::from_le_bytes([element[0], element[1], element[2], element[3]]);
    (DataValue::Float(value), Quality::from_qds(element[4]))
}

fn decode_counter(element: &[u8]) -> (DataValue, Quality) {
    let value = i32::from_le_bytes([element[0], element[1], element[2], element[3]]);
    // BCR sequence byte: IV in bit 7, CA/CY below; only IV flows into quality
    let quality = if element[4] & 0x80 != 0 {
        Quality::INVALID
    } else {
        Quality::GOOD
    };
    (DataValue::Counter(value), quality)
}
