//! Protocol session logic.
//!
//! A [`Session`] owns everything about one logical link that is not I/O:
//! the connection state machine, the modulo-2^15 send/receive counters, the
//! k/w acknowledgment windows, and the outstanding interrogation. It is
//! synchronous and never blocks; the transport feeds it decoded APDUs and
//! writes out whatever replies it returns, so the protocol rules stay
//! testable without a socket.

use tracing::{debug, warn};

use crate::classify::{FailReason, Failure};
use crate::codec::Apdu;
use crate::config::ProtocolConfig;
use crate::error::{LinkError, Result};
use crate::parser::parse_asdu;
use crate::state::{ConnectionState, LinkEvent};
use crate::types::{Apci, Asdu, Cot, DataPoint, Ioa, TypeId, UFunction, MAX_SEQ};

/// Maximum unacknowledged I-frames we will send (k parameter).
pub const DEFAULT_K: u16 = 12;

/// Received I-frames before we must acknowledge (w parameter).
pub const DEFAULT_W: u16 = 8;

/// Something the session wants the application to see.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Decoded process values from one I-format ASDU.
    Points {
        /// Station the values belong to
        common_address: u16,
        /// Decoded points with acceptable quality
        points: Vec<DataPoint>,
    },
    /// A classified failure.
    Failed(Failure),
    /// The outstanding general interrogation terminated.
    InterrogationComplete {
        /// Station that completed the interrogation
        common_address: u16,
    },
    /// Activation confirmation for a command we sent.
    CommandConfirm {
        /// Station that confirmed
        common_address: u16,
        /// Addressed information object, when the confirm carries one
        ioa: Option<u32>,
        /// False when the peer set the negative flag
        success: bool,
    },
    /// The connection state machine moved to a new state.
    StateChanged(ConnectionState),
}

/// Result of feeding one APDU (or one local event) into the session.
#[derive(Debug, Default)]
pub struct SessionOutput {
    /// Frames to write back to the peer, in order.
    pub replies: Vec<Apdu>,
    /// Updates for the application, in order.
    pub updates: Vec<Update>,
}

impl SessionOutput {
    fn state_changed(&mut self, before: ConnectionState, after: ConnectionState) {
        if before != after {
            self.updates.push(Update::StateChanged(after));
        }
    }

    fn fail(&mut self, reason: FailReason, message: impl Into<String>) {
        self.updates.push(Update::Failed(Failure::new(reason, message)));
    }
}

/// Outstanding general interrogation, one at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingInterrogation {
    common_address: u16,
    originator: u8,
}

/// Per-link protocol session.
#[derive(Debug)]
pub struct Session {
    config: ProtocolConfig,
    state: ConnectionState,
    /// V(S): sequence number of the next I-frame we send.
    send_seq: u16,
    /// V(R): sequence number we expect on the next received I-frame.
    recv_seq: u16,
    /// Highest send sequence the peer has acknowledged.
    peer_acked: u16,
    /// Received I-frames since our last outgoing acknowledgment.
    recv_since_ack: u16,
    k: u16,
    w: u16,
    pending_interrogation: Option<PendingInterrogation>,
}

impl Session {
    /// Create a session with default k/w windows.
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Unattempted,
            send_seq: 0,
            recv_seq: 0,
            peer_acked: 0,
            recv_since_ack: 0,
            k: DEFAULT_K,
            w: DEFAULT_W,
            pending_interrogation: None,
        }
    }

    /// Override the k/w acknowledgment windows.
    pub fn with_windows(mut self, k: u16, w: u16) -> Self {
        self.k = k;
        self.w = w;
        self
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Protocol profile in use.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Whether data transfer is currently permitted.
    pub fn can_transfer(&self) -> bool {
        self.state.can_transfer()
    }

    /// I-frames sent but not yet acknowledged by the peer.
    pub fn unacked(&self) -> u16 {
        self.send_seq.wrapping_sub(self.peer_acked) & MAX_SEQ
    }

    /// Received I-frames we have not yet acknowledged.
    pub fn pending_ack(&self) -> u16 {
        self.recv_since_ack
    }

    fn transition(&mut self, event: LinkEvent, out: &mut SessionOutput) {
        let before = self.state;
        self.state = self.state.apply(event);
        out.state_changed(before, self.state);
    }

    /// Note that a transport handshake is being attempted.
    ///
    /// Resets the sequence counters; a fresh link always starts at zero.
    pub fn connect_started(&mut self) -> SessionOutput {
        let mut out = SessionOutput::default();
        self.send_seq = 0;
        self.recv_seq = 0;
        self.peer_acked = 0;
        self.recv_since_ack = 0;
        self.pending_interrogation = None;
        self.transition(LinkEvent::HandshakeStarted, &mut out);
        out
    }

    /// Note that the transport handshake failed or was refused.
    pub fn connect_failed(&mut self, message: impl Into<String>) -> SessionOutput {
        let mut out = SessionOutput::default();
        self.transition(LinkEvent::HandshakeFailed, &mut out);
        out.fail(FailReason::Network, message);
        out
    }

    /// Note that the transport dropped underneath us.
    pub fn transport_lost(&mut self) -> SessionOutput {
        let mut out = SessionOutput::default();
        self.transition(LinkEvent::TransportLost, &mut out);
        out.fail(FailReason::Network, "transport disconnected");
        self.pending_interrogation = None;
        out
    }

    /// The outstanding interrogation ran out of time.
    pub fn interrogation_timeout(&mut self) -> SessionOutput {
        let mut out = SessionOutput::default();
        if let Some(pending) = self.pending_interrogation.take() {
            self.transition(LinkEvent::InterrogationTimeout, &mut out);
            out.fail(
                FailReason::InterroUnfinished,
                format!(
                    "interrogation of station {} timed out without termination",
                    pending.common_address
                ),
            );
        }
        out
    }

    /// Build the STARTDT act frame that opens data transfer.
    pub fn start_data_transfer(&self) -> Apdu {
        Apdu::u_format(UFunction::StartDtAct)
    }

    /// Build the STOPDT act frame for a graceful stop.
    pub fn request_stop(&self) -> Apdu {
        Apdu::u_format(UFunction::StopDtAct)
    }

    /// Build an S-frame acknowledging everything received so far.
    pub fn acknowledge(&mut self) -> Apdu {
        self.recv_since_ack = 0;
        Apdu::s_format(self.recv_seq)
    }

    /// Begin a general interrogation of `common_address`.
    ///
    /// Fails with [`LinkError::Collision`] while a previous interrogation is
    /// still outstanding, and with [`LinkError::NotConnected`] when the link
    /// is not open for data transfer.
    pub fn start_interrogation(&mut self, common_address: u16) -> Result<(Apdu, SessionOutput)> {
        if self.pending_interrogation.is_some() {
            return Err(LinkError::Collision("interrogation already outstanding"));
        }
        if !self.state.can_transfer() {
            return Err(LinkError::NotConnected);
        }

        // QOI 20 requests the global (station) interrogation group
        let asdu = Asdu::interrogation_command(common_address, 20);
        let originator = asdu.header.originator;
        let frame = self.next_i_frame(asdu)?;

        let mut out = SessionOutput::default();
        self.transition(LinkEvent::InterrogationSent, &mut out);
        self.pending_interrogation = Some(PendingInterrogation {
            common_address,
            originator,
        });
        debug!(common_address, "general interrogation started");
        Ok((frame, out))
    }

    /// Wrap a command ASDU into the next I-frame.
    pub fn send_command(&mut self, asdu: Asdu) -> Result<Apdu> {
        if !self.state.can_transfer() {
            return Err(LinkError::NotConnected);
        }
        self.next_i_frame(asdu)
    }

    fn next_i_frame(&mut self, asdu: Asdu) -> Result<Apdu> {
        if self.unacked() >= self.k {
            return Err(LinkError::TooManyUnconfirmed(self.k));
        }
        let frame = Apdu::i_format(self.send_seq, self.recv_seq, asdu);
        self.send_seq = (self.send_seq + 1) & MAX_SEQ;
        // The I-frame's receive field acknowledges everything pending
        self.recv_since_ack = 0;
        Ok(frame)
    }

    /// Feed one decoded APDU from the peer through the protocol rules.
    pub fn handle_apdu(&mut self, apdu: Apdu) -> SessionOutput {
        let mut out = SessionOutput::default();
        match apdu.apci {
            Apci::UFormat { function } => self.handle_u_format(function, &mut out),
            Apci::SFormat { recv_seq } => {
                self.handle_ack(recv_seq, &mut out);
            }
            Apci::IFormat { send_seq, recv_seq } => {
                if !self.handle_ack(recv_seq, &mut out) {
                    return out;
                }
                if !self.check_incoming_seq(send_seq, &mut out) {
                    return out;
                }
                if let Some(asdu) = apdu.asdu {
                    self.handle_asdu(asdu, &mut out);
                } else {
                    out.fail(FailReason::ServerError, "I-format frame without ASDU");
                }
                if self.recv_since_ack >= self.w {
                    let ack = self.acknowledge();
                    out.replies.push(ack);
                }
            }
        }
        out
    }

    fn handle_u_format(&mut self, function: UFunction, out: &mut SessionOutput) {
        match function {
            UFunction::StartDtCon => self.transition(LinkEvent::StartDtConfirmed, out),
            UFunction::StopDtCon => {
                self.transition(LinkEvent::StopDtConfirmed, out);
                self.pending_interrogation = None;
            }
            UFunction::TestFrAct => out.replies.push(Apdu::u_format(UFunction::TestFrCon)),
            UFunction::TestFrCon => {}
            UFunction::StartDtAct | UFunction::StopDtAct => {
                // Only the controlled station receives act frames
                out.fail(
                    FailReason::RtuSide,
                    format!("unexpected {function:?} from peer"),
                );
            }
        }
    }

    /// Process the acknowledgment field of an I- or S-frame.
    ///
    /// Returns false when the acknowledgment is outside the window of frames
    /// we actually sent, which is unrecoverable desynchronization.
    fn handle_ack(&mut self, ack: u16, out: &mut SessionOutput) -> bool {
        let newly_acked = ack.wrapping_sub(self.peer_acked) & MAX_SEQ;
        let outstanding = self.unacked();
        if newly_acked > outstanding {
            warn!(
                ack,
                send_seq = self.send_seq,
                peer_acked = self.peer_acked,
                "peer acknowledged frames never sent"
            );
            self.transition(LinkEvent::SequenceDesync, out);
            out.fail(
                FailReason::SeqDesync,
                format!("acknowledgment {ack} outside send window"),
            );
            return false;
        }
        self.peer_acked = ack;
        true
    }

    /// Validate the peer's send sequence against our receive counter.
    fn check_incoming_seq(&mut self, send_seq: u16, out: &mut SessionOutput) -> bool {
        if send_seq != self.recv_seq {
            warn!(
                received = send_seq,
                expected = self.recv_seq,
                "receive counter desynchronized"
            );
            self.transition(LinkEvent::SequenceDesync, out);
            out.fail(
                FailReason::SeqDesync,
                format!("expected sequence {}, received {send_seq}", self.recv_seq),
            );
            return false;
        }
        self.recv_seq = (self.recv_seq + 1) & MAX_SEQ;
        self.recv_since_ack += 1;
        true
    }

    fn handle_asdu(&mut self, asdu: Asdu, out: &mut SessionOutput) {
        let header = &asdu.header;
        let common_address = header.common_address;

        if header.negative {
            let reason = FailReason::from_negative_cot(header.cot)
                .unwrap_or(FailReason::NegativeBit);
            out.fail(
                reason,
                format!(
                    "negative confirmation from station {common_address} ({})",
                    header.cot
                ),
            );
            if header.cot == Cot::ActivationConfirm {
                out.updates.push(Update::CommandConfirm {
                    common_address,
                    ioa: self.first_ioa(&asdu),
                    success: false,
                });
            }
            return;
        }

        match header.cot {
            Cot::ActivationTermination => self.handle_termination(&asdu, out),
            Cot::ActivationConfirm | Cot::DeactivationConfirm => {
                if header.type_id != TypeId::InterrogationCommand {
                    out.updates.push(Update::CommandConfirm {
                        common_address,
                        ioa: self.first_ioa(&asdu),
                        success: true,
                    });
                }
            }
            _ => self.handle_data(&asdu, out),
        }
    }

    fn handle_termination(&mut self, asdu: &Asdu, out: &mut SessionOutput) {
        let header = &asdu.header;
        if header.type_id != TypeId::InterrogationCommand {
            // Terminations of plain commands need no bookkeeping
            return;
        }
        match self.pending_interrogation {
            Some(pending)
                if pending.common_address == header.common_address
                    && pending.originator == header.originator =>
            {
                self.pending_interrogation = None;
                self.transition(LinkEvent::InterrogationTerminated, out);
                out.updates.push(Update::InterrogationComplete {
                    common_address: header.common_address,
                });
            }
            Some(pending) => {
                out.fail(
                    FailReason::InterroUnfinished,
                    format!(
                        "termination for station {} does not match outstanding \
                         interrogation of station {}",
                        header.common_address, pending.common_address
                    ),
                );
            }
            None => {
                out.fail(
                    FailReason::InterroUnfinished,
                    format!(
                        "unsolicited interrogation termination from station {}",
                        header.common_address
                    ),
                );
            }
        }
    }

    fn handle_data(&mut self, asdu: &Asdu, out: &mut SessionOutput) {
        if !self.state.can_transfer() {
            out.fail(
                FailReason::RtuSide,
                format!("data from station {} while link not open", asdu.header.common_address),
            );
            return;
        }
        match parse_asdu(asdu, &self.config) {
            Ok(points) => {
                let mut good = Vec::with_capacity(points.len());
                for point in points {
                    if point.quality.is_acceptable() {
                        good.push(point);
                    } else {
                        out.fail(
                            FailReason::BadQuality,
                            format!("object {} carries quality {}", point.ioa, point.quality),
                        );
                    }
                }
                if !good.is_empty() {
                    out.updates.push(Update::Points {
                        common_address: asdu.header.common_address,
                        points: good,
                    });
                }
            }
            Err(err) => {
                out.fail(err.classify(), err.to_string());
            }
        }
    }

    fn first_ioa(&self, asdu: &Asdu) -> Option<u32> {
        if let Some(obj) = asdu.objects.first() {
            return Some(obj.ioa.value());
        }
        Ioa::parse(&asdu.raw_data, self.config.ioa_width)
            .ok()
            .map(|ioa| ioa.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AsduHeader;
    use bytes::Bytes;

    fn open_session() -> Session {
        open_session_with_windows(DEFAULT_K, DEFAULT_W)
    }

    fn open_session_with_windows(k: u16, w: u16) -> Session {
        let mut session = Session::new(ProtocolConfig::default()).with_windows(k, w);
        session.connect_started();
        session.handle_apdu(Apdu::u_format(UFunction::StartDtCon));
        session
    }

    fn measured_float_asdu(coa: u16, ioa: u32, value: f32, quality: u8) -> Asdu {
        let mut asdu = Asdu::new(AsduHeader::new(
            TypeId::MeasuredFloat,
            1,
            Cot::Spontaneous,
            coa,
        ));
        let mut data = value.to_le_bytes().to_vec();
        data.push(quality);
        asdu.objects
            .push(crate::types::InformationObject::new(Ioa::new(ioa), Bytes::from(data)));
        // Data-direction tests feed the parser through raw_data
        let mut raw = Vec::new();
        raw.extend_from_slice(&ioa.to_le_bytes()[..3]);
        raw.extend_from_slice(&value.to_le_bytes());
        raw.push(quality);
        asdu.raw_data = Bytes::from(raw);
        asdu.objects.clear();
        asdu
    }

    fn termination_asdu(coa: u16) -> Asdu {
        let mut asdu = Asdu::interrogation_command(coa, 20);
        asdu.header.cot = Cot::ActivationTermination;
        asdu
    }

    #[test]
    fn test_startdt_confirm_opens_link() {
        let mut session = Session::new(ProtocolConfig::default());
        session.connect_started();
        assert_eq!(session.state(), ConnectionState::Unattempted);

        let out = session.handle_apdu(Apdu::u_format(UFunction::StartDtCon));
        assert_eq!(session.state(), ConnectionState::Open);
        assert_eq!(out.updates, vec![Update::StateChanged(ConnectionState::Open)]);
        assert!(session.can_transfer());
    }

    #[test]
    fn test_testfr_act_gets_confirm() {
        let mut session = open_session();
        let out = session.handle_apdu(Apdu::u_format(UFunction::TestFrAct));
        assert_eq!(out.replies, vec![Apdu::u_format(UFunction::TestFrCon)]);
        assert!(out.updates.is_empty());
    }

    #[test]
    fn test_interrogation_lifecycle() {
        let mut session = open_session();
        let (frame, out) = session.start_interrogation(1).unwrap();
        assert!(frame.is_i_format());
        assert_eq!(session.state(), ConnectionState::InterroStarted);
        assert_eq!(
            out.updates,
            vec![Update::StateChanged(ConnectionState::InterroStarted)]
        );

        // Matching termination completes the procedure
        let out = session.handle_apdu(Apdu::i_format(0, 1, termination_asdu(1)));
        assert_eq!(session.state(), ConnectionState::InterroDone);
        assert!(out
            .updates
            .contains(&Update::InterrogationComplete { common_address: 1 }));
    }

    #[test]
    fn test_second_interrogation_collides() {
        let mut session = open_session();
        session.start_interrogation(1).unwrap();
        let err = session.start_interrogation(1).unwrap_err();
        assert!(matches!(err, LinkError::Collision(_)));
        assert_eq!(err.classify(), FailReason::Collision);
    }

    #[test]
    fn test_mismatched_termination_keeps_state() {
        let mut session = open_session();
        session.start_interrogation(1).unwrap();

        let out = session.handle_apdu(Apdu::i_format(0, 1, termination_asdu(2)));
        assert_eq!(session.state(), ConnectionState::InterroStarted);
        let failed = out.updates.iter().any(|u| {
            matches!(u, Update::Failed(f) if f.reason == FailReason::InterroUnfinished)
        });
        assert!(failed);
    }

    #[test]
    fn test_interrogation_timeout_degrades_to_unknown() {
        let mut session = open_session();
        session.start_interrogation(1).unwrap();
        let out = session.interrogation_timeout();
        assert_eq!(session.state(), ConnectionState::Unknown);
        let failed = out.updates.iter().any(|u| {
            matches!(u, Update::Failed(f) if f.reason == FailReason::InterroUnfinished)
        });
        assert!(failed);
    }

    #[test]
    fn test_sequence_skip_degrades_to_unknown() {
        let mut session = open_session();
        // Peer jumps to send sequence 5 while we expect 0
        let out = session.handle_apdu(Apdu::i_format(5, 0, measured_float_asdu(1, 100, 1.0, 0)));
        assert_eq!(session.state(), ConnectionState::Unknown);
        let failed = out.updates.iter().any(|u| {
            matches!(u, Update::Failed(f) if f.reason == FailReason::SeqDesync)
        });
        assert!(failed);
        assert!(out.replies.is_empty());
    }

    #[test]
    fn test_ack_of_unsent_frame_is_desync() {
        let mut session = open_session();
        let out = session.handle_apdu(Apdu::s_format(3));
        assert_eq!(session.state(), ConnectionState::Unknown);
        let failed = out.updates.iter().any(|u| {
            matches!(u, Update::Failed(f) if f.reason == FailReason::SeqDesync)
        });
        assert!(failed);
    }

    #[test]
    fn test_good_points_delivered() {
        let mut session = open_session();
        let out = session.handle_apdu(Apdu::i_format(0, 0, measured_float_asdu(1, 200, 2.5, 0)));
        assert_eq!(out.updates.len(), 1);
        match &out.updates[0] {
            Update::Points { common_address, points } => {
                assert_eq!(*common_address, 1);
                assert_eq!(points.len(), 1);
                assert_eq!(points[0].ioa, 200);
            }
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[test]
    fn test_invalid_quality_classified() {
        let mut session = open_session();
        // QDS with the IV bit set
        let out = session.handle_apdu(Apdu::i_format(0, 0, measured_float_asdu(1, 200, 2.5, 0x80)));
        let failed = out.updates.iter().any(|u| {
            matches!(u, Update::Failed(f) if f.reason == FailReason::BadQuality)
        });
        assert!(failed);
        assert!(!out.updates.iter().any(|u| matches!(u, Update::Points { .. })));
    }

    #[test]
    fn test_w_threshold_triggers_ack() {
        let mut session = open_session_with_windows(12, 2);
        let first = session.handle_apdu(Apdu::i_format(0, 0, measured_float_asdu(1, 10, 1.0, 0)));
        assert!(first.replies.is_empty());
        let second = session.handle_apdu(Apdu::i_format(1, 0, measured_float_asdu(1, 11, 1.0, 0)));
        assert_eq!(second.replies, vec![Apdu::s_format(2)]);
    }

    #[test]
    fn test_k_window_blocks_sends() {
        let mut session = open_session_with_windows(2, 8);
        session.send_command(Asdu::single_command(1, 300, true, false)).unwrap();
        session.send_command(Asdu::single_command(1, 300, false, false)).unwrap();
        let err = session
            .send_command(Asdu::single_command(1, 300, true, false))
            .unwrap_err();
        assert!(matches!(err, LinkError::TooManyUnconfirmed(2)));

        // An acknowledgment reopens the window
        session.handle_apdu(Apdu::s_format(2));
        assert_eq!(session.unacked(), 0);
        session.send_command(Asdu::single_command(1, 300, true, false)).unwrap();
    }

    #[test]
    fn test_command_confirm_reported() {
        let mut session = open_session();
        let mut asdu = Asdu::single_command(1, 300, true, false);
        asdu.header.cot = Cot::ActivationConfirm;
        let out = session.handle_apdu(Apdu::i_format(0, 0, asdu));
        assert_eq!(
            out.updates,
            vec![Update::CommandConfirm {
                common_address: 1,
                ioa: Some(300),
                success: true,
            }]
        );
    }

    #[test]
    fn test_negative_confirm_classified() {
        let mut session = open_session();
        let mut asdu = Asdu::single_command(1, 300, true, false);
        asdu.header.cot = Cot::ActivationConfirm;
        asdu.header.negative = true;
        let out = session.handle_apdu(Apdu::i_format(0, 0, asdu));
        let failed = out.updates.iter().any(|u| {
            matches!(u, Update::Failed(f) if f.reason == FailReason::NegativeBit)
        });
        assert!(failed);
        assert!(out.updates.contains(&Update::CommandConfirm {
            common_address: 1,
            ioa: Some(300),
            success: false,
        }));
    }

    #[test]
    fn test_unknown_ioa_negative_maps_to_bad_ioa() {
        let mut session = open_session();
        let mut asdu = Asdu::single_command(1, 300, true, false);
        asdu.header.cot = Cot::UnknownIoa;
        asdu.header.negative = true;
        let out = session.handle_apdu(Apdu::i_format(0, 0, asdu));
        let failed = out.updates.iter().any(|u| {
            matches!(u, Update::Failed(f) if f.reason == FailReason::BadIoa)
        });
        assert!(failed);
    }

    #[test]
    fn test_transport_lost_closes_link() {
        let mut session = open_session();
        let out = session.transport_lost();
        assert_eq!(session.state(), ConnectionState::Closed);
        let failed = out.updates.iter().any(|u| {
            matches!(u, Update::Failed(f) if f.reason == FailReason::Network)
        });
        assert!(failed);
        assert!(session.start_interrogation(1).is_err());
    }

    #[test]
    fn test_counters_reset_on_reconnect() {
        let mut session = open_session();
        session.send_command(Asdu::single_command(1, 300, true, false)).unwrap();
        session.transport_lost();

        session.connect_started();
        assert_eq!(session.state(), ConnectionState::Unattempted);
        assert_eq!(session.unacked(), 0);
    }
}
