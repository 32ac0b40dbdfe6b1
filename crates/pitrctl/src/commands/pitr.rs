//! `pitrctl pitr`

use super::App;
use crate::cli::PitrArgs;
use crate::output::{emit, emit_plan};
use pitr_common::host::Host;
use pitr_common::pitr::Orchestrator;
use pitr_common::target::RecoveryTarget;
use pitr_common::Outcome;
use tracing::debug;

pub async fn pitr(app: &App, args: &PitrArgs) -> i32 {
    // Bad targets are reported before touching the host
    if let Err(e) = RecoveryTarget::from_flags(&args.target_flags()) {
        let outcome = Outcome::from(e);
        emit(&outcome, app.format);
        return outcome.exit_code();
    }

    let host = Host::new(&app.config, &args.conn.overrides());
    let opts = args.options(host.data_dir.clone(), host.ctx.dbsu.clone());
    let deps = match host.collaborators() {
        Ok(deps) => deps,
        Err(e) => {
            let outcome = Outcome::from(e);
            emit(&outcome, app.format);
            return outcome.exit_code();
        }
    };

    let mut orchestrator = Orchestrator::new(deps)
        .policy(app.config.timing.stop_policy())
        .countdown(app.config.timing.countdown())
        .stanza(host.stanza());

    if opts.plan_only {
        return match orchestrator.plan(&opts) {
            Ok(plan) => {
                emit_plan(&plan, app.format);
                0
            }
            Err(e) => {
                let outcome = Outcome::from(e);
                emit(&outcome, app.format);
                outcome.exit_code()
            }
        };
    }

    let outcome = orchestrator.execute(&opts).await;
    debug!("PITR finished in state {:?}", orchestrator.state());
    emit(&outcome, app.format);
    outcome.exit_code()
}
