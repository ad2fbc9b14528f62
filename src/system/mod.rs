//! System utilities shared by the Gateway and Orchestrator.

mod locker;

pub use locker::{Locker, LockerGuard};
