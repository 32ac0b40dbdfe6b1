//! pitrctl - PostgreSQL point-in-time recovery driven by pgBackRest.

use clap::Parser;
use pitr_common::codes::CONFIG_INVALID;
use pitr_common::config::Config;
use pitr_common::Outcome;
use pitrctl::cli::{Cli, Commands};
use pitrctl::commands::{self, App};
use pitrctl::{logging, output};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = match cli.config_file.as_deref() {
        Some(path) => match Config::load_from_path(path) {
            Ok(config) => config,
            Err(e) => {
                let outcome = Outcome::fail(CONFIG_INVALID, format!("cannot load config {}", path))
                    .with_detail(format!("{:#}", e));
                output::emit(&outcome, cli.output);
                std::process::exit(outcome.exit_code());
            }
        },
        None => Config::load(),
    };
    config.apply_env(|key| std::env::var(key).ok());

    let app = App {
        config,
        format: cli.output,
        verbose: cli.verbose,
    };

    let code = match &cli.command {
        Commands::Pitr(args) => commands::pitr(&app, args).await,
        Commands::Role { detail, conn } => commands::role(&app, *detail, conn),
        Commands::Backup { kind, force, conn } => commands::backup(&app, kind, *force, conn),
        Commands::Promote { conn } => commands::promote(&app, conn),
    };
    std::process::exit(code);
}
