//! Command-line definition.

use clap::{Args, Parser, Subcommand};
use pitr_common::host::Overrides;
use pitr_common::pitr::PitrOptions;
use pitr_common::target::TargetFlags;
use pitr_common::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "pitrctl")]
#[command(about = "PostgreSQL point-in-time recovery with pgBackRest", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output format: text, json, json-pretty, yaml
    #[arg(short, long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// pitrctl configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config_file: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore the cluster to a point in time
    #[command(after_help = PITR_EXAMPLES)]
    Pitr(PitrArgs),

    /// Detect whether this instance is primary or replica
    Role {
        /// Show how the role was determined
        #[arg(short = 'V', long)]
        detail: bool,

        #[command(flatten)]
        conn: ConnArgs,
    },

    /// Take a pgBackRest backup (primary only)
    Backup {
        /// Backup type: full, diff, incr
        #[arg(short = 't', long = "type", default_value = "full")]
        kind: String,

        /// Back up even if the role cannot be determined
        #[arg(short, long)]
        force: bool,

        #[command(flatten)]
        conn: ConnArgs,
    },

    /// Promote a replica to primary
    Promote {
        #[command(flatten)]
        conn: ConnArgs,
    },
}

const PITR_EXAMPLES: &str = "\
Examples:
  pitrctl pitr -d                              recover to end of WAL
  pitrctl pitr -t \"2025-01-01 12:00:00+08\"     recover to a timestamp
  pitrctl pitr -t 2025-01-01                   midnight, local time zone
  pitrctl pitr -I                              backup consistency point
  pitrctl pitr -d --plan                       show the plan only
  pitrctl pitr -d -y                           skip the countdown";

/// Where the server, its superuser and pgBackRest live
#[derive(Args, Debug, Clone, Default)]
pub struct ConnArgs {
    /// pgBackRest stanza (detected from config if omitted)
    #[arg(short, long)]
    pub stanza: Option<String>,

    /// pgBackRest config file
    #[arg(short = 'c', long = "config")]
    pub backrest_config: Option<String>,

    /// pgBackRest repository index
    #[arg(short, long)]
    pub repo: Option<String>,

    /// Database superuser
    #[arg(short = 'U', long)]
    pub dbsu: Option<String>,

    /// PostgreSQL data directory
    #[arg(short = 'D', long)]
    pub data: Option<String>,
}

impl ConnArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            dbsu: self.dbsu.clone(),
            data_dir: self.data.clone(),
            backrest_config: self.backrest_config.clone(),
            stanza: self.stanza.clone(),
            repo: self.repo.clone(),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct PitrArgs {
    /// Recover to the end of the WAL stream
    #[arg(short, long)]
    pub default: bool,

    /// Recover to the backup consistency point
    #[arg(short = 'I', long)]
    pub immediate: bool,

    /// Recover to a timestamp, date or time of day
    #[arg(short, long)]
    pub time: Option<String>,

    /// Recover to a named restore point
    #[arg(short, long)]
    pub name: Option<String>,

    /// Recover to an LSN
    #[arg(short, long)]
    pub lsn: Option<String>,

    /// Recover to a transaction id
    #[arg(short, long)]
    pub xid: Option<String>,

    /// Backup set to restore from
    #[arg(short = 'b', long)]
    pub set: Option<String>,

    /// Do not stop Patroni
    #[arg(short = 'S', long)]
    pub skip_patroni: bool,

    /// Leave PostgreSQL stopped after restore
    #[arg(short = 'N', long)]
    pub no_restart: bool,

    /// Show the execution plan without changing anything
    #[arg(long, alias = "dry-run")]
    pub plan: bool,

    /// Skip the confirmation countdown
    #[arg(short, long)]
    pub yes: bool,

    /// Stop just before the target
    #[arg(short = 'X', long)]
    pub exclusive: bool,

    /// Promote once the target is reached
    #[arg(short = 'P', long)]
    pub promote: bool,

    #[command(flatten)]
    pub conn: ConnArgs,
}

impl PitrArgs {
    pub fn target_flags(&self) -> TargetFlags {
        TargetFlags {
            default: self.default,
            immediate: self.immediate,
            time: self.time.clone(),
            name: self.name.clone(),
            lsn: self.lsn.clone(),
            xid: self.xid.clone(),
        }
    }

    /// Options for a run against `data_dir` as `dbsu`
    pub fn options(&self, data_dir: std::path::PathBuf, dbsu: String) -> PitrOptions {
        PitrOptions {
            target: self.target_flags(),
            backup_set: self.set.clone(),
            data_dir,
            dbsu,
            skip_cluster: self.skip_patroni,
            no_restart: self.no_restart,
            exclusive: self.exclusive,
            promote: self.promote,
            plan_only: self.plan,
            yes: self.yes,
        }
    }
}
