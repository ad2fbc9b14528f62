//! Gateway (spec §4.4)
//!
//! Route matcher, auth, event builder, invoker, circuit breaker,
//! per-function worker pools, heartbeat janitor. Grounded on the teacher's
//! `router/` (axum `Router` + `AppState` assembly) and `server/manager.rs`
//! (lazily-created per-entity state behind `DashMap`).

pub mod auth;
pub mod breaker;
pub mod event;
pub mod handlers;
pub mod invoke;
pub mod janitor;
pub mod orchestrator_client;
pub mod pool;
pub mod router;

pub use janitor::run_janitor;
pub use router::{build_router, AppState};
