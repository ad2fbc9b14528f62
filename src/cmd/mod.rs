//! CLI command handlers for `faasd-orchestrator`. The Gateway binary takes
//! no subcommands of its own.

use clap::Subcommand;

pub mod diagnostics;

#[derive(Subcommand)]
pub enum Commands {
    /// Print Docker connectivity, socket path, and managed container count.
    Diagnostics,
}
