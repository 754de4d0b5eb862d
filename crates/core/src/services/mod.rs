//! Orchestration and host wiring on top of the core engine.

pub mod analysis;
pub mod hosts;
