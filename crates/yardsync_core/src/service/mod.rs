//! Use-case services over the document store.
//!
//! # Responsibility
//! - Fix the record type and field mapping for each record kind.
//! - Tie store lifecycle and sync lifecycle together for the host app.

pub mod workspace;
pub mod yard_service;
