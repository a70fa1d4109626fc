//! Flutter-facing bindings for the yard core.

pub mod api;
