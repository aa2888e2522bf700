//! Flutter bridge surface for the slotting engine.

pub mod api;
