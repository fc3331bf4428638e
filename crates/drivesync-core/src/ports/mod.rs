//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the synchronization core depends on, whose
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRecordStore`] - Persistent local store for remote record state
//! - [`RecordCodec`] - Encoding of local record payloads

pub mod record_codec;
pub mod record_store;

pub use record_codec::{JsonRecordCodec, RecordCodec};
pub use record_store::IRecordStore;
