//! Types shared by the Container Driver and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reference to one running container (spec §3 "Worker").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub created_ts: DateTime<Utc>,
}

/// Status returned by `inspect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    Exited,
    Paused,
    Created,
    Restarting,
    Removing,
    Dead,
    Missing,
}

#[derive(Debug, Clone)]
pub struct Inspection {
    pub status: ContainerStatus,
    pub ip: Option<String>,
    pub id: String,
}
