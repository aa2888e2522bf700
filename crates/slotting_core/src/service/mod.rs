//! Core use-case services.
//!
//! # Responsibility
//! - Turn caller commands into atomic, verified grid state transitions.
//! - Keep FFI and CLI layers decoupled from grid and storage internals.

pub mod command;
pub mod matrix_service;
