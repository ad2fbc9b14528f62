//! faasd — local emulator of a managed function-as-a-service invocation plane
//!
//! Two cooperating services share this library: the Gateway (route
//! matching, auth, event envelope construction, worker pools, circuit
//! breaker, heartbeat janitor) and the Orchestrator (container lifecycle
//! over Docker, startup reconciliation, idle reaper, readiness probing).

pub mod cmd;
pub mod config;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod registry;
pub mod system;
pub mod trace;
