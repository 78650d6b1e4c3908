//! Multi-step task orchestration.
//!
//! A request is planned into ordered [`task::Step`]s, each step is routed to a
//! specialist profile by the [`agent::AgentRegistry`], and the
//! [`agent::AgentCoordinator`] runs the resulting assignments one at a time
//! through the [`agent::StepExecutor`].

pub mod agent;
pub mod config;
pub mod task;
pub mod tools;
