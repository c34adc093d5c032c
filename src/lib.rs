//! TapNode library: gesture-driven sensor node core.
//!
//! This crate holds all tap detection, network selection, transport
//! fallback and modem protocol logic with no platform dependencies, testable
//! on any host with `cargo test`. The ESP-IDF firmware in `firmware-std/` is
//! a thin consumer that supplies the radios, storage, sensors and buzzer by
//! implementing the traits defined here.
//!
//! Layout, leaf-first:
//! - `clock`, `config`, `board`: time seam, runtime settings, pin maps
//! - `tap`, `credentials`, `selector`: button gestures, saved networks,
//!   WiFi candidate policy
//! - `gps`, `modem`: AT command driver for the cellular module
//! - `radio`, `transport`, `protocol`: radio arbitration, the three-tier
//!   delivery chain and its JSON payload
//! - `comm`, `sensor`, `feedback`, `node`: BLE service surface and the
//!   event loop context
//!
//! `no_std`, no allocator.

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod clock;
pub mod comm;
pub mod config;
pub mod credentials;
pub mod feedback;
pub mod gps;
pub mod modem;
pub mod node;
pub mod protocol;
pub mod radio;
pub mod selector;
pub mod sensor;
pub mod tap;
pub mod transport;

/// Crate name, for boot banners
pub const NAME: &str = env!("CARGO_PKG_NAME");
