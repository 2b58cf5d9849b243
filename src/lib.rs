//! # mentor-core
//!
//! Proactive mentor pipeline for a wearable assistant backend.
//!
//! Live transcript segments are buffered per session, dispatched on a
//! segment bound or an idle timeout, evaluated by a single structured LLM
//! call against a versioned top-K memory pack, and gated by layered rate
//! limits before a notification goes out.

pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod kv;
pub mod llm;
pub mod memory;
pub mod mentor;
pub mod model;
pub mod ports;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod telemetry;
pub mod usage;
