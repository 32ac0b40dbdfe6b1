//! Subcommand handlers. Each returns the process exit code.

mod backup;
mod pitr;
mod promote;
mod role;

pub use backup::backup;
pub use pitr::pitr;
pub use promote::promote;
pub use role::role;

use pitr_common::config::Config;
use pitr_common::OutputFormat;

/// Settings shared by every subcommand
#[derive(Debug, Clone)]
pub struct App {
    pub config: Config,
    pub format: OutputFormat,
    pub verbose: u8,
}
