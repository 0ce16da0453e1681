//! Schema-driven CCSDS spacecraft telemetry decommutation.
//!
//! Two decoders share the bit-level machinery in [`bits`]:
//!
//! * [`packet`] decodes streams of concatenated space packets, selecting each
//!   record's layout from a [`schema::PacketSchema`] container definition
//!   using values decoded from the primary header.
//! * [`construction`] decodes EDOS Production Data Set construction records,
//!   a single fixed-layout record of repeated, counted substructures.
//!
//! Decoding is synchronous and operates on fully materialized buffers; I/O,
//! decompression, and persistence belong to the caller. Diagnostics are
//! emitted through [tracing](https://crates.io/crates/tracing), so any
//! subscriber the caller installs will see them.
//!
//! References:
//! * CCSDS Space Packet Protocol 133.0-B-1
//!     - <https://public.ccsds.org/Pubs/133x0b1c2.pdf>

mod error;

pub mod bits;
pub mod construction;
pub mod packet;
pub mod schema;
pub mod timecode;

pub use error::{Error, Result};
