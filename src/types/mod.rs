//! Core protocol types.
//!
//! - `Apci` - control octets and frame discrimination (I/S/U)
//! - `Asdu` - application service data unit and addressing
//! - `Cot` - cause of transmission
//! - `TypeId` - type identification
//! - `Quality` - quality descriptor bitmask
//! - `DataPoint` / `DataValue` - decoded information object values

mod apci;
mod asdu;
mod cot;
mod data;
mod quality;
mod type_id;

pub use apci::*;
pub use asdu::*;
pub use cot::*;
pub use data::*;
pub use quality::*;
pub use type_id::*;
