//! Adapter implementations for lease storage ports.

pub mod memory;
pub mod postgres;
