//! Step definitions for project lease hand-off scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
