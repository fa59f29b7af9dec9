//! Identity verification and rental payment lifecycle workflows.
//!
//! The crate exposes three workflows behind axum routers: a PKCE-bound identity
//! verification handshake, the rental application state machine, and payment
//! reconciliation against an external gateway.

pub mod access;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
pub mod repository;
pub mod telemetry;
pub mod workflows;
