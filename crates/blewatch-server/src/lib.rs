//! # blewatch-server
//!
//! HTTP server library for the blewatch Bluetooth LE discovery engine.
//!
//! This library provides the API handlers, state management, and logging
//! setup used by the `blewatch-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod event_log;
pub mod logging;
pub mod state;
