//! Asynchronous controlling-station (master) endpoint.
//!
//! Wires a TCP transport through the frame codec into a [`Session`] and
//! forwards session updates into an mpsc channel. The channel receiver is
//! usually handed to a [`crate::dispatch::DispatchWorker`], keeping the
//! application handler off the I/O task.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{Apdu, ApduCodec};
use crate::config::ProtocolConfig;
use crate::error::{LinkError, Result};
use crate::session::{Session, SessionOutput, Update};
use crate::state::ConnectionState;
use crate::types::{
    Asdu, AsduHeader, Cot, Cp56Time2a, InformationObject, Ioa, TypeId, UFunction,
};

/// Default IEC 104 port.
pub const DEFAULT_PORT: u16 = 2404;

/// Default T1 timeout (send confirmation) in seconds.
pub const DEFAULT_T1_TIMEOUT: u64 = 15;

/// Default T2 timeout (acknowledgment latency) in seconds.
pub const DEFAULT_T2_TIMEOUT: u64 = 10;

/// Default T3 timeout (idle test frame) in seconds.
pub const DEFAULT_T3_TIMEOUT: u64 = 20;

/// Default bound on an outstanding general interrogation, in seconds.
pub const DEFAULT_INTERRO_TIMEOUT: u64 = 45;

/// Master configuration.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Outstation address (host:port)
    pub address: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// T1 timeout: time to wait for a confirmation after sending
    pub t1_timeout: Duration,
    /// T2 timeout: max latency before acknowledging received I-frames
    pub t2_timeout: Duration,
    /// T3 timeout: idle time before probing with TESTFR
    pub t3_timeout: Duration,
    /// Bound on an outstanding general interrogation
    pub interrogation_timeout: Duration,
    /// K parameter: max unconfirmed sent I-frames
    pub k: u16,
    /// W parameter: received I-frames before an acknowledgment is due
    pub w: u16,
    /// Protocol profile (field widths, address ranges)
    pub protocol: ProtocolConfig,
}

impl MasterConfig {
    /// Create a new configuration with the given address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_secs(10),
            t1_timeout: Duration::from_secs(DEFAULT_T1_TIMEOUT),
            t2_timeout: Duration::from_secs(DEFAULT_T2_TIMEOUT),
            t3_timeout: Duration::from_secs(DEFAULT_T3_TIMEOUT),
            interrogation_timeout: Duration::from_secs(DEFAULT_INTERRO_TIMEOUT),
            k: crate::session::DEFAULT_K,
            w: crate::session::DEFAULT_W,
            protocol: ProtocolConfig::default(),
        }
    }

    /// Set connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set T1 timeout.
    pub fn t1_timeout(mut self, timeout: Duration) -> Self {
        self.t1_timeout = timeout;
        self
    }

    /// Set T2 timeout.
    pub fn t2_timeout(mut self, timeout: Duration) -> Self {
        self.t2_timeout = timeout;
        self
    }

    /// Set T3 timeout.
    pub fn t3_timeout(mut self, timeout: Duration) -> Self {
        self.t3_timeout = timeout;
        self
    }

    /// Set the protocol profile.
    pub fn protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }
}

/// IEC 60870-5-104 controlling station.
pub struct Master {
    config: MasterConfig,
    session: Session,
    update_tx: mpsc::Sender<Update>,
    update_rx: Option<mpsc::Receiver<Update>>,
    framed: Option<Framed<TcpStream, ApduCodec>>,
    last_recv_time: Instant,
    interrogation_deadline: Option<Instant>,
}

impl Master {
    /// Create a new master for the given configuration.
    pub fn new(config: MasterConfig) -> Self {
        let (update_tx, update_rx) = mpsc::channel(100);
        let session = Session::new(config.protocol.clone()).with_windows(config.k, config.w);
        Self {
            config,
            session,
            update_tx,
            update_rx: Some(update_rx),
            framed: None,
            last_recv_time: Instant::now(),
            interrogation_deadline: None,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Take the update receiver.
    ///
    /// This can only be called once. Returns None if already taken.
    pub fn subscribe(&mut self) -> Option<mpsc::Receiver<Update>> {
        self.update_rx.take()
    }

    /// Connect the transport.
    pub async fn connect(&mut self) -> Result<()> {
        if self.framed.is_some() {
            return Err(LinkError::Connection("already connected".into()));
        }

        let out = self.session.connect_started();
        self.emit_output(out).await;

        let stream = match timeout(
            self.config.connect_timeout,
            TcpStream::connect(&self.config.address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let out = self.session.connect_failed(e.to_string());
                self.emit_output(out).await;
                return Err(LinkError::Io(e));
            }
            Err(_) => {
                let out = self.session.connect_failed("connect timed out");
                self.emit_output(out).await;
                return Err(LinkError::ConnectionTimeout);
            }
        };

        // Nagle would delay the small control frames
        stream.set_nodelay(true).ok();

        self.framed = Some(Framed::new(
            stream,
            ApduCodec::with_config(self.config.protocol.clone()),
        ));
        self.last_recv_time = Instant::now();
        info!(address = %self.config.address, "transport connected");
        Ok(())
    }

    /// Disconnect, stopping data transfer first when it is active.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.framed.is_none() {
            return Ok(());
        }
        if self.session.can_transfer() {
            self.stop_dt().await.ok();
        }
        self.framed = None;
        self.interrogation_deadline = None;
        if self.session.state() != ConnectionState::Closed {
            let out = self.session.transport_lost();
            self.emit_output(out).await;
        }
        info!("transport disconnected");
        Ok(())
    }

    /// Start data transfer (STARTDT act) and wait for the confirm.
    pub async fn start_dt(&mut self) -> Result<()> {
        if self.session.state() != ConnectionState::Unattempted {
            return Err(LinkError::InvalidState("link is not awaiting STARTDT"));
        }

        self.send_frame(self.session.start_data_transfer()).await?;
        let response = self.recv_frame_timeout(self.config.t1_timeout).await?;
        self.process_apdu(response).await;

        if self.session.state() == ConnectionState::Open {
            info!("data transfer started");
            Ok(())
        } else {
            Err(LinkError::protocol("unexpected response to STARTDT"))
        }
    }

    /// Stop data transfer (STOPDT act) and wait for the confirm.
    pub async fn stop_dt(&mut self) -> Result<()> {
        if !self.session.can_transfer() {
            return Err(LinkError::InvalidState("data transfer not active"));
        }

        self.send_frame(self.session.request_stop()).await?;
        let response = self.recv_frame_timeout(self.config.t1_timeout).await?;
        self.process_apdu(response).await;

        if self.session.state() == ConnectionState::Closed {
            info!("data transfer stopped");
            Ok(())
        } else {
            Err(LinkError::protocol("unexpected response to STOPDT"))
        }
    }

    /// Send a general interrogation command for `common_address`.
    pub async fn general_interrogation(&mut self, common_address: u16) -> Result<()> {
        let (frame, out) = self.session.start_interrogation(common_address)?;
        self.emit_output(out).await;
        self.send_frame(frame).await?;
        self.interrogation_deadline = Some(Instant::now() + self.config.interrogation_timeout);
        Ok(())
    }

    /// Send a counter interrogation command.
    pub async fn counter_interrogation(&mut self, common_address: u16, group: u8) -> Result<()> {
        self.send_command(Asdu::counter_interrogation(common_address, group))
            .await
    }

    /// Send a clock synchronization command.
    pub async fn clock_sync(&mut self, common_address: u16, time: Cp56Time2a) -> Result<()> {
        self.send_command(Asdu::clock_sync_command(common_address, time))
            .await
    }

    /// Send a single command (C_SC_NA_1).
    pub async fn single_command(
        &mut self,
        common_address: u16,
        ioa: u32,
        value: bool,
        select: bool,
    ) -> Result<()> {
        self.send_command(Asdu::single_command(common_address, ioa, value, select))
            .await
    }

    /// Send a double command (C_DC_NA_1).
    pub async fn double_command(
        &mut self,
        common_address: u16,
        ioa: u32,
        value: u8,
        select: bool,
    ) -> Result<()> {
        let mut asdu = Asdu::new(AsduHeader::new(
            TypeId::DoubleCommand,
            1,
            Cot::Activation,
            common_address,
        ));
        // DCO: bits 0-1 state (1=OFF, 2=ON), bit 7 select/execute
        let dco = (value & 0x03) | if select { 0x80 } else { 0x00 };
        asdu.objects.push(InformationObject::new(
            Ioa::new(ioa),
            Bytes::copy_from_slice(&[dco]),
        ));
        self.send_command(asdu).await
    }

    /// Send a setpoint command, short floating point (C_SE_NC_1).
    pub async fn setpoint_float(
        &mut self,
        common_address: u16,
        ioa: u32,
        value: f32,
        select: bool,
    ) -> Result<()> {
        let mut asdu = Asdu::new(AsduHeader::new(
            TypeId::SetpointFloat,
            1,
            Cot::Activation,
            common_address,
        ));
        // Value (4 bytes) + QOS (1 byte, bit 7 select/execute)
        let v = value.to_le_bytes();
        let qos = if select { 0x80 } else { 0x00 };
        asdu.objects.push(InformationObject::new(
            Ioa::new(ioa),
            Bytes::copy_from_slice(&[v[0], v[1], v[2], v[3], qos]),
        ));
        self.send_command(asdu).await
    }

    /// Drive the link once.
    ///
    /// Call in a loop: handles the T2/T3 timers, the interrogation deadline,
    /// and at most one incoming frame per call. Returns without error when
    /// nothing arrived within the poll interval.
    pub async fn poll(&mut self) -> Result<()> {
        if self.framed.is_none() {
            return Err(LinkError::NotConnected);
        }

        if let Some(deadline) = self.interrogation_deadline {
            if Instant::now() >= deadline {
                self.interrogation_deadline = None;
                let out = self.session.interrogation_timeout();
                self.emit_output(out).await;
            }
        }

        let idle = self.last_recv_time.elapsed();
        if idle > self.config.t3_timeout {
            debug!("idle link, probing with TESTFR");
            self.send_frame(Apdu::u_format(UFunction::TestFrAct)).await?;
            self.last_recv_time = Instant::now();
        }
        if self.session.pending_ack() > 0 && idle > self.config.t2_timeout {
            let ack = self.session.acknowledge();
            self.send_frame(ack).await?;
        }

        let framed = self.framed.as_mut().ok_or(LinkError::NotConnected)?;
        match timeout(Duration::from_millis(100), framed.next()).await {
            Ok(Some(Ok(apdu))) => {
                self.last_recv_time = Instant::now();
                self.process_apdu(apdu).await;
                Ok(())
            }
            Ok(Some(Err(e))) => {
                warn!(error = %e, "frame decode failed");
                self.emit_output_of_error(&e).await;
                Err(e)
            }
            Ok(None) => {
                self.framed = None;
                let out = self.session.transport_lost();
                self.emit_output(out).await;
                Err(LinkError::Connection("connection closed by peer".into()))
            }
            // Poll interval elapsed without traffic
            Err(_) => Ok(()),
        }
    }

    async fn send_command(&mut self, asdu: Asdu) -> Result<()> {
        let frame = self.session.send_command(asdu)?;
        self.send_frame(frame).await
    }

    async fn send_frame(&mut self, apdu: Apdu) -> Result<()> {
        let framed = self.framed.as_mut().ok_or(LinkError::NotConnected)?;
        framed.send(apdu).await
    }

    async fn process_apdu(&mut self, apdu: Apdu) {
        let SessionOutput { replies, updates } = self.session.handle_apdu(apdu);
        for reply in replies {
            if let Err(e) = self.send_frame(reply).await {
                warn!(error = %e, "failed to send protocol reply");
            }
        }
        if updates
            .iter()
            .any(|u| matches!(u, Update::InterrogationComplete { .. }))
        {
            self.interrogation_deadline = None;
        }
        for update in updates {
            let _ = self.update_tx.send(update).await;
        }
    }

    async fn emit_output(&mut self, out: SessionOutput) {
        for reply in out.replies {
            if let Err(e) = self.send_frame(reply).await {
                warn!(error = %e, "failed to send protocol reply");
            }
        }
        for update in out.updates {
            let _ = self.update_tx.send(update).await;
        }
    }

    async fn emit_output_of_error(&mut self, err: &LinkError) {
        let failure = crate::classify::Failure::new(err.classify(), err.to_string());
        let _ = self.update_tx.send(Update::Failed(failure)).await;
    }

    async fn recv_frame_timeout(&mut self, timeout_duration: Duration) -> Result<Apdu> {
        let framed = self.framed.as_mut().ok_or(LinkError::NotConnected)?;
        match timeout(timeout_duration, framed.next()).await {
            Ok(Some(Ok(apdu))) => {
                self.last_recv_time = Instant::now();
                Ok(apdu)
            }
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => {
                self.framed = None;
                let out = self.session.transport_lost();
                self.emit_output(out).await;
                Err(LinkError::Connection("connection closed".into()))
            }
            Err(_) => Err(LinkError::T1Timeout),
        }
    }
}
