//! Trace-driven simulation of a single set-associative cache.
//!
//! Every access of a trace is split into a tag and a set index, looked up in
//! its [`set::Set`], and counted in the cache's [`stats::Stats`]. Eviction
//! order comes from a [`replace::Replace`] policy, write counting from the
//! cache's [`config::WritePolicy`].

pub mod cache;
pub mod config;
pub mod experiment;
pub mod replace;
pub mod set;
pub mod stats;
pub mod trace;
