//! DriveSync Core - Domain types, ports and progress tracking
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `RemoteRecord`, `RemoteFile`, `Version`, `ChangeToken`
//! - **Error taxonomy** - `SyncError` and its per-record / per-file wrappers
//! - **Port definitions** - Traits for adapters: `IRecordStore`, `RecordCodec`
//! - **Progress** - `Progress`, `Completion`, `Operation`: cancellation and
//!   exactly-once result delivery shared by every adapter operation
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure types with no I/O. Ports define trait
//! interfaces that adapter crates (`drivesync-cache`, `drivesync-drive`)
//! implement or consume.

pub mod config;
pub mod domain;
pub mod logging;
pub mod ports;
pub mod progress;
