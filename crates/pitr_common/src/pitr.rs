//! Point-in-time recovery orchestration.
//!
//! Drives one recovery run through its states:
//!
//! `Init → Prechecked → ConfirmPending → ClusterStopping → DatabaseStopping
//!  → Restoring → DatabaseStarting → GuidancePrinted`
//!
//! `Failed` is absorbing and reachable from every non-terminal state. The
//! plan and the execution both walk `planned_steps`, so a plan always lists
//! exactly the steps a run would attempt.

use crate::backrest::{BackupTool, RestoreRequest};
use crate::cluster::ClusterManager;
use crate::confirm::{os_interrupt, Countdown};
use crate::errors::{PitrError, PitrResult};
use crate::exec::shell_quote;
use crate::guidance::{write_guidance, GuidanceContext};
use crate::pgdata::DataDirInspector;
use crate::plan::{Plan, Resource};
use crate::postgres::PostgresControl;
use crate::preflight::{Prechecked, PreflightValidator, SystemState};
use crate::restore::RestoreCoordinator;
use crate::result::Outcome;
use crate::service_state::{ServiceStateController, StopPolicy};
use crate::target::{RecoveryTarget, TargetFlags};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Name of the binary in reconstructed command lines
pub const COMMAND_NAME: &str = "pitrctl";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PitrOptions {
    pub target: TargetFlags,
    /// Backup set label, latest when empty
    pub backup_set: Option<String>,
    /// Effective data directory
    pub data_dir: PathBuf,
    /// Effective database superuser
    pub dbsu: String,
    /// Leave the cluster manager running
    pub skip_cluster: bool,
    /// Leave PostgreSQL stopped after restore
    pub no_restart: bool,
    /// Stop just before the target
    pub exclusive: bool,
    /// Promote when recovery reaches the target
    pub promote: bool,
    /// Only build the plan
    pub plan_only: bool,
    /// Skip the confirmation countdown
    pub yes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PitrState {
    Init,
    Prechecked,
    ConfirmPending,
    ClusterStopping,
    DatabaseStopping,
    Restoring,
    DatabaseStarting,
    GuidancePrinted,
    Failed,
}

/// One executable phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    StopCluster,
    EnsureStopped,
    Restore,
    StartDatabase,
    PrintGuidance,
}

impl Step {
    /// State the run is in while this step executes
    pub fn state(self) -> PitrState {
        match self {
            Step::StopCluster => PitrState::ClusterStopping,
            Step::EnsureStopped => PitrState::DatabaseStopping,
            Step::Restore => PitrState::Restoring,
            Step::StartDatabase => PitrState::DatabaseStarting,
            Step::PrintGuidance => PitrState::GuidancePrinted,
        }
    }

    pub fn describe(self, state: &SystemState) -> String {
        match self {
            Step::StopCluster => format!("Stop {} service", state.cluster_service),
            Step::EnsureStopped => "Ensure PostgreSQL is stopped".to_string(),
            Step::Restore => "Execute pgBackRest restore".to_string(),
            Step::StartDatabase => "Start PostgreSQL".to_string(),
            Step::PrintGuidance => "Print post-restore guidance".to_string(),
        }
    }
}

/// Ordered steps a run would attempt for this state and options
pub fn planned_steps(state: &SystemState, opts: &PitrOptions) -> Vec<Step> {
    let mut steps = Vec::with_capacity(5);
    if state.cluster_active && !opts.skip_cluster {
        steps.push(Step::StopCluster);
    }
    if state.pg_running || state.cluster_active {
        steps.push(Step::EnsureStopped);
    }
    steps.push(Step::Restore);
    if !opts.no_restart {
        steps.push(Step::StartDatabase);
    }
    steps.push(Step::PrintGuidance);
    steps
}

/// Steps deliberately left out by a flag
pub fn skipped_steps(state: &SystemState, opts: &PitrOptions) -> Vec<String> {
    let mut skipped = Vec::new();
    if opts.skip_cluster {
        skipped.push(format!("Skip {} (--skip-patroni)", state.cluster_service));
    }
    if opts.no_restart {
        skipped.push("Skip PostgreSQL start (--no-restart)".to_string());
    }
    skipped
}

/// Equivalent command line for the options
pub fn build_command(opts: &PitrOptions) -> String {
    let t = &opts.target;
    let mut args: Vec<String> = vec![COMMAND_NAME.to_string(), "pitr".to_string()];
    let some = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(shell_quote);

    if t.default {
        args.push("-d".to_string());
    } else if t.immediate {
        args.push("-I".to_string());
    } else if let Some(v) = some(&t.time) {
        args.extend(["-t".to_string(), v]);
    } else if let Some(v) = some(&t.name) {
        args.extend(["-n".to_string(), v]);
    } else if let Some(v) = some(&t.lsn) {
        args.extend(["-l".to_string(), v]);
    } else if let Some(v) = some(&t.xid) {
        args.extend(["-x".to_string(), v]);
    }

    if let Some(set) = some(&opts.backup_set) {
        args.extend(["-b".to_string(), set]);
    }
    if opts.skip_cluster {
        args.push("--skip-patroni".to_string());
    }
    if opts.no_restart {
        args.push("--no-restart".to_string());
    }
    if opts.exclusive {
        args.push("-X".to_string());
    }
    if opts.promote {
        args.push("-P".to_string());
    }
    if opts.plan_only {
        args.push("--plan".to_string());
    }
    args.join(" ")
}

fn backup_set_label(opts: &PitrOptions) -> String {
    opts.backup_set
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("latest")
        .to_string()
}

/// Build the plan from the captured state alone
pub fn build_plan(state: &SystemState, target: &RecoveryTarget, opts: &PitrOptions) -> Plan {
    let mut plan = Plan {
        command: build_command(opts),
        ..Default::default()
    };
    for step in planned_steps(state, opts) {
        plan.push_action(step.describe(state));
    }
    plan.skipped = skipped_steps(state, opts);

    let description = target.describe();
    if state.cluster_active && !opts.skip_cluster {
        plan.affects.push(Resource::new(
            "service",
            state.cluster_service.clone(),
            "stop",
            "cluster management paused",
        ));
    }
    if state.pg_running || state.cluster_active {
        plan.affects.push(Resource::new("service", "postgresql", "stop", ""));
    }
    plan.affects.push(Resource::new("backup", backup_set_label(opts), "restore", "pgBackRest"));
    plan.affects.push(Resource::new("target", description.clone(), "recovery", ""));
    plan.affects.push(Resource::new(
        "data",
        state.data_dir.display().to_string(),
        "overwrite",
        "data directory restored",
    ));

    plan.expected = format!(
        "PostgreSQL restored to {} (data dir: {})",
        description,
        state.data_dir.display()
    );
    if opts.no_restart {
        plan.expected.push_str("; PostgreSQL remains stopped");
    }
    if opts.promote {
        plan.expected.push_str("; auto-promote enabled");
    }

    plan.risks.push("Current data directory will be overwritten".to_string());
    if state.cluster_active && !opts.skip_cluster {
        plan.risks.push(format!(
            "{} will be stopped; HA management suspended",
            state.cluster_service
        ));
    }
    if opts.skip_cluster {
        plan.risks.push(format!(
            "{} is not stopped; ensure cluster safety before restoring",
            state.cluster_service
        ));
    }
    if opts.no_restart {
        plan.risks.push("PostgreSQL will remain stopped after restore".to_string());
    }
    if opts.exclusive {
        plan.risks
            .push("Exclusive recovery stops before target; data beyond target not applied".to_string());
    }
    plan.risks.push(
        "Stop, restore and start cannot be cancelled once started; an interrupted run needs manual recovery"
            .to_string(),
    );
    plan.risks.push(
        "No locking against concurrent runs; do not run two recoveries on the same data directory".to_string(),
    );
    plan
}

/// Clamped run duration
pub fn duration_seconds(started: DateTime<Utc>, completed: DateTime<Utc>) -> f64 {
    let secs = (completed - started).num_milliseconds() as f64 / 1000.0;
    secs.max(0.0)
}

/// Payload of a successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitrReport {
    pub run_id: Uuid,
    pub target: String,
    pub data_dir: String,
    pub backup_set: String,
    pub cluster_stopped: bool,
    pub postgres_restarted: bool,
    pub promote: bool,
    pub exclusive: bool,
    pub started_at: String,
    pub completed_at: String,
    pub duration_seconds: f64,
    /// Executed steps, in order
    pub steps: Vec<String>,
}

/// Payload of a failed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitrFailure {
    pub run_id: Uuid,
    pub state: PitrState,
    /// State the run was in when it failed
    pub failed_in: PitrState,
    pub completed_steps: Vec<String>,
}

/// External systems a run acts on
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub cluster: &'a dyn ClusterManager,
    pub pg: &'a dyn PostgresControl,
    pub tool: &'a dyn BackupTool,
    pub inspector: &'a dyn DataDirInspector,
}

pub struct Orchestrator<'a> {
    deps: Collaborators<'a>,
    policy: StopPolicy,
    countdown: Countdown,
    stanza: Option<String>,
    out: Box<dyn Write + 'a>,
    state: PitrState,
}

struct Progress {
    run_id: Uuid,
    completed: Vec<String>,
    cluster_stopped: bool,
    restarted: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(deps: Collaborators<'a>) -> Self {
        Self {
            deps,
            policy: StopPolicy::default(),
            countdown: Countdown::default(),
            stanza: None,
            out: Box::new(std::io::stderr()),
            state: PitrState::Init,
        }
    }

    pub fn policy(mut self, policy: StopPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn countdown(mut self, countdown: Countdown) -> Self {
        self.countdown = countdown;
        self
    }

    pub fn stanza(mut self, stanza: Option<String>) -> Self {
        self.stanza = stanza;
        self
    }

    /// Where the plan banner and guidance go (stderr by default)
    pub fn output(mut self, out: Box<dyn Write + 'a>) -> Self {
        self.out = out;
        self
    }

    /// Current state of the run
    pub fn state(&self) -> PitrState {
        self.state
    }

    fn precheck(&mut self, opts: &PitrOptions) -> PitrResult<Prechecked> {
        let validator = PreflightValidator::new(self.deps.cluster, self.deps.pg, self.deps.inspector);
        let pre = validator.validate(&opts.target, &opts.data_dir, &opts.dbsu)?;
        self.state = PitrState::Prechecked;
        Ok(pre)
    }

    /// Validate and describe without changing anything
    pub fn plan(&mut self, opts: &PitrOptions) -> PitrResult<Plan> {
        let pre = self.precheck(opts).inspect_err(|_| self.state = PitrState::Failed)?;
        Ok(build_plan(&pre.state, &pre.target, opts))
    }

    /// Run with Ctrl-C/SIGTERM as the countdown interrupt
    pub async fn execute(&mut self, opts: &PitrOptions) -> Outcome {
        self.execute_with(opts, os_interrupt()).await
    }

    pub async fn execute_with<F>(&mut self, opts: &PitrOptions, interrupt: F) -> Outcome
    where
        F: Future<Output = ()>,
    {
        let started = Utc::now();
        let mut progress = Progress {
            run_id: Uuid::new_v4(),
            completed: Vec::new(),
            cluster_stopped: false,
            restarted: false,
        };

        let pre = match self.precheck(opts) {
            Ok(pre) => pre,
            Err(e) => return self.fail(&progress, e),
        };
        let plan = build_plan(&pre.state, &pre.target, opts);

        if opts.plan_only {
            return Outcome::ok("PITR plan generated").with_data(&plan);
        }

        if let Err(e) = writeln!(self.out, "{}", plan.to_text()) {
            warn!("Cannot write PITR plan: {}", e);
        }

        if !opts.yes {
            self.state = PitrState::ConfirmPending;
            if let Err(e) = self.countdown.run("PITR", interrupt, self.out.as_mut()).await {
                return self.fail(&progress, e);
            }
        }

        let request = RestoreRequest {
            data_dir: pre.state.data_dir.clone(),
            backup_set: opts.backup_set.clone().filter(|s| !s.is_empty()),
            target: pre.target.clone(),
            exclusive: opts.exclusive,
            promote: opts.promote,
        };

        for step in planned_steps(&pre.state, opts) {
            self.state = step.state();
            info!("PITR step: {}", step.describe(&pre.state));
            if let Err(e) = self.run_step(step, &pre, &request, opts, &mut progress).await {
                return self.fail(&progress, e);
            }
            progress.completed.push(step.describe(&pre.state));
        }
        self.state = PitrState::GuidancePrinted;

        let completed = Utc::now();
        let report = PitrReport {
            run_id: progress.run_id,
            target: pre.target.describe(),
            data_dir: pre.state.data_dir.display().to_string(),
            backup_set: backup_set_label(opts),
            cluster_stopped: progress.cluster_stopped,
            postgres_restarted: progress.restarted,
            promote: opts.promote,
            exclusive: opts.exclusive,
            started_at: started.to_rfc3339(),
            completed_at: completed.to_rfc3339(),
            duration_seconds: duration_seconds(started, completed),
            steps: progress.completed.clone(),
        };
        info!("PITR completed in {:.1}s", report.duration_seconds);
        Outcome::ok("PITR completed").with_data(&report)
    }

    async fn run_step(
        &mut self,
        step: Step,
        pre: &Prechecked,
        request: &RestoreRequest,
        opts: &PitrOptions,
        progress: &mut Progress,
    ) -> PitrResult<()> {
        let services = ServiceStateController::new(self.deps.cluster, self.deps.pg, self.policy);
        match step {
            Step::StopCluster => {
                services.stop_cluster().await?;
                progress.cluster_stopped = true;
            }
            Step::EnsureStopped => {
                services.ensure_database_stopped(progress.cluster_stopped).await?;
            }
            Step::Restore => {
                RestoreCoordinator::new(self.deps.tool, self.deps.pg).restore(request)?;
            }
            Step::StartDatabase => {
                services.start_database().await?;
                progress.restarted = true;
            }
            Step::PrintGuidance => {
                let ctx = GuidanceContext {
                    data_dir: pre.state.data_dir.clone(),
                    no_restart: opts.no_restart,
                    promote: opts.promote,
                    cluster_stopped: progress.cluster_stopped,
                    cluster_service: pre.state.cluster_service.clone(),
                    stanza: self.stanza.clone(),
                };
                write_guidance(self.out.as_mut(), &ctx)?;
            }
        }
        Ok(())
    }

    fn fail(&mut self, progress: &Progress, err: PitrError) -> Outcome {
        let failed_in = self.state;
        self.state = PitrState::Failed;
        error!("PITR failed in {:?}: {}", failed_in, err);
        let data = PitrFailure {
            run_id: progress.run_id,
            state: PitrState::Failed,
            failed_in,
            completed_steps: progress.completed.clone(),
        };
        Outcome::from(err).with_data(&data)
    }
}
