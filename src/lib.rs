//! Helmsman – coordination core for a screen-driven agent.
//!
//! Perception workers observe a live environment and publish fast-changing
//! world state; decision loops consume that state and compete for one shared
//! output channel. This crate is the glue in between: the lock-free state
//! store, the decision state machines, and the arbitrated actuation queue.
//!
//! ## Architecture
//!
//! ```text
//! perception collaborators ──publish──▶ StateStore  (store/)   ← seqlock regions
//!                                          │  snapshot reads
//!                     ┌────────────────────┼─────────────────────┐
//!              Navigator (navigator.rs)    │        TargetingEngine (targeting.rs)
//!                     │        Walker (confirm.rs) – step + confirm
//!                     └──────────┬─────────┴─────────┬───────────┘
//!                                ▼   ActionRequests  ▼
//!                          Arbiter (arbiter.rs) ──▶ Actuator (actuation.rs)
//! ```
//!
//! State is ephemeral and rebuilt from the environment every tick; nothing is
//! persisted. Producers are single-writer per domain, consumers are
//! many-reader, and the only suspension points anywhere are bounded polls.

pub mod actuation;
pub mod arbiter;
pub mod confirm;
pub mod control;
pub mod error;
pub mod navigator;
pub mod route;
pub mod store;
pub mod targeting;
pub mod types;

// Convenience re-exports
pub use actuation::{ActuationCall, Actuator, NullActuator};
pub use arbiter::{ActionCategory, Arbiter, ArbiterHandle, Completion};
pub use confirm::Walker;
pub use control::{CombatGate, VisitedLog};
pub use navigator::{NavState, Navigator, PathProbe, ScriptJob};
pub use route::{waypoint_tag, Route, Waypoint};
pub use store::StateStore;
pub use targeting::TargetingEngine;
pub use types::{AgentSettings, Direction, PathStatus, TilePoint, WaypointKind};
