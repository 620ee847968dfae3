//! Synchronization engine: scoring, deduplication, breakers, cycle
//! orchestration, and scheduling.

pub mod breaker;
pub mod dedup;
pub mod orchestrator;
pub mod scheduler;
pub mod similarity;
