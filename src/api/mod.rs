//! HTTP status and query surface
//!
//! Read-mostly: hearing queries, scheduler/breaker status, health, and an
//! SSE feed of committed changes. The one write is the manual sync
//! trigger. Record ingestion never comes through HTTP; connectors feed
//! the orchestrator directly.

pub mod health;
pub mod hearings;
pub mod sse;
pub mod sync;

pub use health::health_routes;
pub use hearings::hearing_routes;
pub use sse::event_stream;
pub use sync::sync_routes;
