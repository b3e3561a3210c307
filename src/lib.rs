//! # gridlink_iec104
//!
//! IEC 60870-5-104 telecontrol engine for SCADA masters.
//!
//! The crate covers the application layer of an IEC 104 link: framing,
//! sequence counters, the connection state machine, quality and failure
//! classification, and a dispatch worker that decouples frame arrival from
//! application processing. Physical process modelling, topology emulation,
//! and persistence are deliberately left to the surrounding system.
//!
//! ## Layers
//!
//! - [`codec`]: [`ApduCodec`], a `tokio_util` codec between raw bytes and
//!   typed [`Apdu`] values
//! - [`session`]: [`Session`], the synchronous protocol rules (sequence
//!   windows, interrogation tracking, failure classification)
//! - [`state`]: [`ConnectionState`], the pure per-link state machine
//! - [`master`]: [`Master`], the async TCP controlling station
//! - [`dispatch`]: [`DispatchWorker`], bounded-queue handler execution
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gridlink_iec104::{Master, MasterConfig, DispatchWorker};
//!
//! #[tokio::main]
//! async fn main() -> gridlink_iec104::Result<()> {
//!     let mut master = Master::new(MasterConfig::new("192.168.1.100:2404"));
//!     let updates = master.subscribe().unwrap();
//!
//!     let mut worker = DispatchWorker::new(updates, |update| {
//!         println!("update: {update:?}");
//!     });
//!     worker.start();
//!
//!     master.connect().await?;
//!     master.start_dt().await?;
//!     master.general_interrogation(1).await?;
//!
//!     loop {
//!         master.poll().await?;
//!     }
//! }
//! ```
//!
//! ## Wire format
//!
//! Every APDU starts with `0x68`, a length byte, and four control octets:
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+
//! | 0x68   | Length | Control Field (4 bytes)           |
//! +--------+--------+--------+--------+--------+--------+
//! ```
//!
//! Bit 0 of the first control octet discriminates I-format (0) from S/U
//! (1); bit 1 then separates S (0) from U (1). I-format frames carry an
//! ASDU payload and two 15-bit sequence numbers; S-frames acknowledge; U
//! frames carry STARTDT/STOPDT/TESTFR control functions.
//!
//! Originator, common-address, and IOA field widths are profile
//! configuration, not constants: see [`ProtocolConfig`].

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod classify;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod master;
pub mod parser;
pub mod session;
pub mod state;
pub mod types;

// Re-export main types
pub use classify::{FailReason, Failure};
pub use codec::{Apdu, ApduCodec};
pub use config::ProtocolConfig;
pub use dispatch::DispatchWorker;
pub use error::{LinkError, Result};
pub use master::{Master, MasterConfig};
pub use parser::parse_asdu;
pub use session::{Session, SessionOutput, Update};
pub use state::{ConnectionState, LinkEvent};
pub use types::*;
