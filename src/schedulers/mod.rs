//! Superstep scheduling: deciding which nodes in a frontier actually need to
//! run, and running the eligible ones concurrently.
//!
//! This is the Pregel-style "vertex program" half of execution; [`App`](crate::app::App)
//! owns the graph and the barrier/reduction side, [`Scheduler`](scheduler::Scheduler)
//! owns picking and running one superstep's worth of nodes.

pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerError, SchedulerState, StepRunResult};
