//! Module Exports
//!
//! This file exports the key modules used for operator input ingestion.
//!
//! # Modules
//! - `protocol`: decoding of `[x,y,r,a,e]` wire records.
//! - `server`: WebSocket endpoint feeding decoded records to the controller.

/// Wire-record decoding.
pub mod protocol;
/// Module for managing the WebSocket server and its receive loop.
pub mod server;
