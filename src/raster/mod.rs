//! Shared-grid alignment, overlap counting and count → color rendering.

pub mod classify;
pub mod composite;
pub mod grid;
