//! Actuation core for the Forklift Bot on no-std embedded platforms.
//!
//! For a runnable host target, see `flb-app/mock-mcu`.
#![no_std]

pub mod utils;
