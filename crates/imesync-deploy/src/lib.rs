//! # imesync-deploy
//!
//! Orchestrated operations over the imesync data roots:
//! - `deploy`: load, patch, propagate, reinitialize the engine, persist
//! - `sync`: lightweight propagation with optional cloud mirroring
//! - `reset`: recreate the data roots from bundled defaults and redeploy
//!
//! The input engine is an external capability behind [`InputEngine`].

pub mod engine;
pub mod orchestrator;
pub mod state;

pub use engine::{CommandEngine, EnginePaths, InputEngine};
pub use orchestrator::{Orchestrator, PropagationReport, SyncSummary};
pub use state::DeployState;
