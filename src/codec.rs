//! APDU codec for tokio.
//!
//! Frame-level encode/decode between raw byte streams and typed [`Apdu`]
//! values, built on the tokio-util codec framework. The codec owns the
//! engine's [`ProtocolConfig`]; there are no global decoder tables, so
//! independent engine instances cannot interfere.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::ProtocolConfig;
use crate::error::LinkError;
use crate::types::{Apci, Asdu, UFunction, MAX_APDU_LENGTH, MIN_APDU_LENGTH, START_BYTE};

/// An IEC 104 APDU.
///
/// The control information plus, for I-format frames, the ASDU payload.
/// Instances are immutable once decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Apdu {
    /// Control octets (frame format and sequence numbers)
    pub apci: Apci,
    /// ASDU payload, present only in I-format frames
    pub asdu: Option<Asdu>,
}

impl Apdu {
    /// Create an I-format APDU carrying an ASDU.
    pub fn i_format(send_seq: u16, recv_seq: u16, asdu: Asdu) -> Self {
        Self {
            apci: Apci::i_format(send_seq, recv_seq),
            asdu: Some(asdu),
        }
    }

    /// Create an S-format APDU.
    pub fn s_format(recv_seq: u16) -> Self {
        Self {
            apci: Apci::s_format(recv_seq),
            asdu: None,
        }
    }

    /// Create a U-format APDU.
    pub fn u_format(function: UFunction) -> Self {
        Self {
            apci: Apci::u_format(function),
            asdu: None,
        }
    }

    /// Check if this is an I-format APDU.
    pub fn is_i_format(&self) -> bool {
        self.apci.is_i_format()
    }

    /// Check if this is an S-format APDU.
    pub fn is_s_format(&self) -> bool {
        self.apci.is_s_format()
    }

    /// Check if this is a U-format APDU.
    pub fn is_u_format(&self) -> bool {
        self.apci.is_u_format()
    }
}

impl std::fmt::Display for Apdu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.apci)?;
        if let Some(asdu) = &self.asdu {
            write!(
                f,
                " [{}] COT={} CA={}",
                asdu.header.type_id, asdu.header.cot, asdu.header.common_address
            )?;
        }
        Ok(())
    }
}

/// Streaming APDU codec.
///
/// Handles partial frames and resynchronizes on garbage by scanning for the
/// start byte. Decode and encode are stateless apart from the framing
/// cursor; both are pure functions of the bytes and the profile.
#[derive(Debug, Clone)]
pub struct ApduCodec {
    config: ProtocolConfig,
    state: DecodeState,
}

#[derive(Debug, Clone, Default)]
enum DecodeState {
    #[default]
    WaitingForStart,
    WaitingForLength,
    WaitingForData {
        length: usize,
    },
}

impl ApduCodec {
    /// Create a codec with the default IEC 104 profile.
    pub fn new() -> Self {
        Self::with_config(ProtocolConfig::default())
    }

    /// Create a codec with an explicit profile.
    pub fn with_config(config: ProtocolConfig) -> Self {
        Self {
            config,
            state: DecodeState::WaitingForStart,
        }
    }

    /// The profile this codec operates under.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }
}

impl Default for ApduCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ApduCodec {
    type Item = Apdu;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Apdu>, LinkError> {
        loop {
            match &self.state {
                DecodeState::WaitingForStart => {
                    while !src.is_empty() && src[0] != START_BYTE {
                        src.advance(1);
                    }
                    if src.is_empty() {
                        return Ok(None);
                    }
                    self.state = DecodeState::WaitingForLength;
                }

                DecodeState::WaitingForLength => {
                    if src.len() < 2 {
                        return Ok(None);
                    }

                    let length = src[1] as usize;
                    if !(MIN_APDU_LENGTH..=MAX_APDU_LENGTH).contains(&length) {
                        // Bad length byte: drop the start byte and resync
                        src.advance(1);
                        self.state = DecodeState::WaitingForStart;
                        continue;
                    }

                    self.state = DecodeState::WaitingForData { length };
                }

                DecodeState::WaitingForData { length } => {
                    let total_length = 2 + length;
                    if src.len() < total_length {
                        return Ok(None);
                    }

                    let frame = src.split_to(total_length);
                    self.state = DecodeState::WaitingForStart;

                    // [0x68] [length] [CF1..CF4] [ASDU...]
                    let apci = Apci::parse(&frame[2..6])?;
                    let asdu = if apci.is_i_format() && frame.len() > 6 {
                        Some(Asdu::parse(&frame[6..], &self.config)?)
                    } else {
                        None
                    };

                    return Ok(Some(Apdu { apci, asdu }));
                }
            }
        }
    }
}

impl Encoder<Apdu> for ApduCodec {
    type Error = LinkError;

    fn encode(&mut self, item: Apdu, dst: &mut BytesMut) -> std::result::Result<(), LinkError> {
        item.apci.validate()?;

        let asdu_len = item
            .asdu
            .as_ref()
            .map(|a| a.encoded_len(&self.config))
            .unwrap_or(0);

        if asdu_len > MAX_APDU_LENGTH - 4 {
            return Err(LinkError::Codec("ASDU too large".into()));
        }

        dst.reserve(6 + asdu_len);
        dst.extend_from_slice(&item.apci.encode_header(asdu_len));

        if let Some(asdu) = &item.asdu {
            asdu.encode_to(dst, &self.config);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FailReason;
    use crate::types::{AsduHeader, Cot, TypeId};

    #[test]
    fn test_decode_u_format() {
        let mut codec = ApduCodec::new();
        let mut buf = BytesMut::from(&[0x68, 0x04, 0x07, 0x00, 0x00, 0x00][..]);

        let apdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(apdu.is_u_format());
        assert_eq!(
            apdu.apci,
            Apci::u_format(UFunction::StartDtAct),
        );
    }

    #[test]
    fn test_decode_s_format_zero() {
        let mut codec = ApduCodec::new();
        let mut buf = BytesMut::from(&[0x68, 0x04, 0x01, 0x00, 0x00, 0x00][..]);

        let apdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(apdu.is_s_format());
        assert_eq!(apdu.apci.recv_seq(), Some(0));

        // Re-encode reproduces the same bytes
        let mut out = BytesMut::new();
        codec.encode(apdu, &mut out).unwrap();
        assert_eq!(&out[..], &[0x68, 0x04, 0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_decode_s_format_seq() {
        let mut codec = ApduCodec::new();
        // recv_seq = 100
        let mut buf = BytesMut::from(&[0x68, 0x04, 0x01, 0x00, 0xC8, 0x00][..]);

        let apdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(apdu.is_s_format());
        assert_eq!(apdu.apci.recv_seq(), Some(100));
    }

    #[test]
    fn test_encode_u_format() {
        let mut codec = ApduCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(Apdu::u_format(UFunction::StartDtAct), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], &[0x68, 0x04, 0x07, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_rejects_out_of_range_seq() {
        let mut codec = ApduCodec::new();
        let mut buf = BytesMut::new();

        let asdu = Asdu::interrogation_command(1, 20);
        let apdu = Apdu::i_format(0x8000, 0, asdu);
        let err = codec.encode(apdu, &mut buf).unwrap_err();
        assert!(matches!(err, LinkError::SequenceOutOfRange(0x8000)));
        assert_eq!(err.classify(), FailReason::TypeUnsupported);
        assert!(buf.is_empty());

        let err = codec.encode(Apdu::s_format(40000), &mut buf).unwrap_err();
        assert!(matches!(err, LinkError::SequenceOutOfRange(40000)));
    }

    #[test]
    fn test_decode_partial_frame() {
        let mut codec = ApduCodec::new();

        let mut buf = BytesMut::from(&[0x68, 0x04][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[0x07, 0x00, 0x00, 0x00]);
        let apdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(apdu.is_u_format());
    }

    #[test]
    fn test_decode_skip_garbage() {
        let mut codec = ApduCodec::new();
        let mut buf = BytesMut::from(&[0xFF, 0xAA, 0x68, 0x04, 0x07, 0x00, 0x00, 0x00][..]);

        let apdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(apdu.is_u_format());
    }

    #[test]
    fn test_decode_bad_length_resyncs() {
        let mut codec = ApduCodec::new();
        // Length 2 is below the APCI minimum; a valid frame follows
        let mut buf =
            BytesMut::from(&[0x68, 0x02, 0x68, 0x04, 0x07, 0x00, 0x00, 0x00][..]);

        let apdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(apdu.is_u_format());
    }

    #[test]
    fn test_unknown_type_classified_unsupported() {
        let mut codec = ApduCodec::new();
        // I-format frame with type ID 200
        let mut buf = BytesMut::from(
            &[
                0x68, 0x0A, 0x00, 0x00, 0x00, 0x00, // APCI, I(S=0, R=0)
                200, 0x01, 0x03, 0x00, 0x01, 0x00, // ASDU header
            ][..],
        );

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, LinkError::UnknownTypeId(200)));
        assert_eq!(err.classify(), FailReason::TypeUnsupported);
    }

    #[test]
    fn test_decode_rejects_unknown_coa() {
        let config = ProtocolConfig::new().valid_coas(vec![1]);
        let mut codec = ApduCodec::with_config(config.clone());

        let asdu = Asdu::new(AsduHeader::new(TypeId::SinglePoint, 0, Cot::Spontaneous, 9));
        let mut buf = BytesMut::new();
        // Encode under a permissive codec, decode under the restricted one
        let mut open_codec = ApduCodec::new();
        open_codec
            .encode(Apdu::i_format(0, 0, asdu), &mut buf)
            .unwrap();

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, LinkError::BadCoa(9)));
        assert_eq!(err.classify(), FailReason::BadCoa);
    }

    #[test]
    fn test_i_format_roundtrip() {
        let mut codec = ApduCodec::new();
        let mut buf = BytesMut::new();

        let asdu = Asdu::interrogation_command(1, 20);
        let original = Apdu::i_format(10, 5, asdu);
        codec.encode(original.clone(), &mut buf).unwrap();

        assert_eq!(buf[0], START_BYTE);
        assert_eq!(buf[1], 14); // 4 control + 10 ASDU
        let wire = buf.clone();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.apci, original.apci);

        // Decoded ASDUs carry the object region as raw bytes; re-encoding
        // must reproduce the original frame
        let mut reencoded = BytesMut::new();
        codec.encode(decoded, &mut reencoded).unwrap();
        assert_eq!(reencoded, wire);
    }

    #[test]
    fn test_u_and_s_roundtrip() {
        let mut codec = ApduCodec::new();

        for func in [
            UFunction::StartDtAct,
            UFunction::StartDtCon,
            UFunction::StopDtAct,
            UFunction::StopDtCon,
            UFunction::TestFrAct,
            UFunction::TestFrCon,
        ] {
            let mut buf = BytesMut::new();
            let original = Apdu::u_format(func);
            codec.encode(original.clone(), &mut buf).unwrap();
            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, original);
        }

        for recv_seq in [0, 100, 32767] {
            let mut buf = BytesMut::new();
            let original = Apdu::s_format(recv_seq);
            codec.encode(original.clone(), &mut buf).unwrap();
            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, original);
        }
    }
}
