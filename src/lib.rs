//! fsprobe - transparent benchmarking for storage filesystems
//!
//! This library wraps a filesystem in an intercepting facade. Each call can
//! trigger one isolated measurement run of the same operation in a child
//! process before the real call executes and returns its real result.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod facade;
pub mod fs;
pub mod harness;
pub mod invocation;
pub mod json_output;
pub mod params;
pub mod path;
pub mod runner;
pub mod stats;
pub mod toggle;
