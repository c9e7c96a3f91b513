//! The process lifecycle controller: C1 Probe, C2 Planner, C3 Tracker, C4
//! Controller, C5 Serialized Starter. Everything outside this module talks
//! to a game's lifecycle only through the types re-exported here.

pub mod controller;
pub mod planner;
pub mod probe;
pub mod starter;
pub mod status;
pub mod tracker;
pub mod types;

pub use controller::Controller;
pub use starter::{StartOutcome, StartTimeouts, Starter};
pub use status::StatusView;
pub use types::{BridgeInfo, ExecutionPlan, LaunchMode, LaunchSpec, ProcessState};
