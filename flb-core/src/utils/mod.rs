//! Utility re-exports and helper macros for the Forklift Bot.
//!
//! This module re-exports the control, math and connection components, and
//! provides a helper macro for static initialization:
//!
//! - `connection`: WebSocket ingestion endpoint and wire-record decoding
//! - `controllers`: motor/servo drivers, the PWM expander and the controller
//! - `math`: numeric helpers and the differential-drive mapping
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod connection;
pub mod controllers;
pub mod math;

pub use connection::server::run as wss;
pub use controllers::SystemController;
pub use embassy_time::*;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
