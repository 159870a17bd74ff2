//! Core kernel modules
//!
//! Contains kernel state, scheduler, thread management, virtual timers and
//! time management.

pub mod config;
pub mod critical;
pub mod cs_cell;
pub mod debug;
pub mod error;
pub mod kernel;
pub mod registry;
pub mod sched;
pub mod thread;
pub mod time;
pub mod types;
pub mod vtimer;
