//! Shared library for pitrctl: PostgreSQL point-in-time recovery with
//! pgBackRest, Patroni-aware service control and role detection.

pub mod backrest;
pub mod cluster;
pub mod codes;
pub mod config;
pub mod confirm;
pub mod errors;
pub mod exec;
pub mod gating;
pub mod guidance;
pub mod host;
pub mod output;
pub mod pgdata;
pub mod pitr;
pub mod plan;
pub mod postgres;
pub mod preflight;
pub mod restore;
pub mod result;
pub mod role;
pub mod service_state;
pub mod target;
pub mod timefmt;

pub use codes::Code;
pub use errors::{PitrError, PitrResult};
pub use output::OutputFormat;
pub use result::Outcome;
