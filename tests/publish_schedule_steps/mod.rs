//! Step definitions for publish booking scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
